//! Reconciles feeds published in different time zones
//!
//! Stop times are local to their agency's zone. Trips of agencies whose UTC
//! offset differs from the model zone are shifted so every time in the model
//! is expressed in the model zone. The offset is taken on the first day the
//! trip's service runs within the service period.

use anyhow::{anyhow, Context};
use chrono::{NaiveDate, Offset, TimeZone};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{BuildContext, GraphBuilderStage, StageKind};
use crate::issues::IssueKind;
use crate::model::TransitModel;

#[derive(Debug, Default)]
pub struct TimeZoneAdjuster;

fn parse_zone(name: &str) -> Result<Tz, String> {
    name.parse::<Tz>()
        .map_err(|_| format!("'{name}' is not a valid IANA time zone"))
}

/// Seconds east of UTC at noon on `date`
fn utc_offset(tz: Tz, date: NaiveDate) -> Option<i32> {
    let noon = date.and_hms_opt(12, 0, 0)?;
    Some(tz.offset_from_utc_datetime(&noon).fix().local_minus_utc())
}

fn model_zone(transit: &TransitModel) -> Option<&str> {
    transit
        .time_zone
        .as_deref()
        .or_else(|| transit.agencies.values().next().map(|a| a.time_zone.as_str()))
}

impl GraphBuilderStage for TimeZoneAdjuster {
    fn kind(&self) -> StageKind {
        StageKind::TimeZoneAdjuster
    }

    fn check_preconditions(&self, ctx: &BuildContext) -> Result<(), String> {
        if let Some(zone) = model_zone(ctx.transit) {
            parse_zone(zone)?;
        }
        for agency in ctx.transit.agencies.values() {
            parse_zone(&agency.time_zone).map_err(|e| format!("agency {}: {e}", agency.id))?;
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut BuildContext) -> anyhow::Result<()> {
        let transit = &mut *ctx.transit;
        let zone_name = model_zone(transit)
            .ok_or_else(|| anyhow!("No time zone configured and no agency registered"))?
            .to_string();
        let model_tz = parse_zone(&zone_name).map_err(|e| anyhow!(e)).context("Invalid model time zone")?;
        transit.time_zone = Some(zone_name.clone());

        let mut shifts: Vec<(usize, i32)> = Vec::new();
        let mut per_agency: BTreeMap<String, (usize, i32)> = BTreeMap::new();
        for (index, trip) in transit.trips.iter().enumerate() {
            let Some(agency) = transit.agency_of_trip(trip) else {
                continue;
            };
            if agency.time_zone == zone_name {
                continue;
            }
            let agency_tz = parse_zone(&agency.time_zone)
                .map_err(|e| anyhow!(e))
                .with_context(|| format!("Invalid time zone of agency {}", agency.id))?;
            let Some(date) = transit
                .services
                .get(&trip.service_id)
                .and_then(|s| s.first_date_within(&transit.service_period))
            else {
                continue;
            };
            let (Some(model_offset), Some(agency_offset)) = (utc_offset(model_tz, date), utc_offset(agency_tz, date))
            else {
                continue;
            };
            let shift = model_offset - agency_offset;
            if shift != 0 {
                shifts.push((index, shift));
                let entry = per_agency.entry(agency.id.clone()).or_insert((0, shift));
                entry.0 += 1;
            }
        }

        for (index, shift) in &shifts {
            transit.trips[*index].shift(*shift);
        }
        for (agency, (trips, shift)) in per_agency {
            debug!(agency = %agency, trips, shift, "Shifted trips to model time zone");
            ctx.issues.add(
                IssueKind::TimeZoneShift,
                format!("Shifted {trips} trips of agency {agency} by {shift}s into {zone_name}"),
            );
        }
        info!(zone = %zone_name, shifted_trips = shifts.len(), "Reconciled agency time zones");
        Ok(())
    }
}
