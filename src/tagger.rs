//! Temporal and variable tagging of aggregated rows.

use crate::engine::ZoneStats;
use crate::table::{clip, StatRow};
use crate::timeslice::SliceDate;

/// Tag values shared by every row of one time slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowTag {
    pub date: String,
    pub year: String,
    pub month: String,
    pub day: String,
    pub level: i64,
    pub variable: String,
}

impl RowTag {
    pub fn new(date: SliceDate, variable: &str, level: i64) -> Self {
        Self {
            date: clip("thedate", &date.justdate()),
            year: clip("YEAR", &date.year.to_string()),
            month: clip("MONTH", &date.month.to_string()),
            day: clip("DAY", &date.day.to_string()),
            level,
            variable: clip("TYPE", variable),
        }
    }
}

/// Attach `tag` to each row, returning new tagged rows.
pub fn tag(rows: &[ZoneStats], tag: &RowTag) -> Vec<StatRow> {
    rows.iter()
        .map(|stats| StatRow {
            name: clip("NAME", &stats.zone_name),
            date: tag.date.clone(),
            year: tag.year.clone(),
            month: tag.month.clone(),
            day: tag.day.clone(),
            variable: tag.variable.clone(),
            level: tag.level,
            zone_code: stats.zone_code,
            count: stats.count,
            area: stats.area,
            min: stats.min,
            max: stats.max,
            range: stats.range,
            mean: stats.mean,
            std: stats.std,
            sum: stats.sum,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_every_row_without_touching_stats() {
        let stats = ZoneStats {
            zone_name: "Upper Rio Grande".to_string(),
            zone_code: 3,
            count: 12,
            area: 12.0,
            min: 0.5,
            max: 4.0,
            range: 3.5,
            mean: 2.0,
            std: 1.0,
            sum: 24.0,
        };
        let tag_values = RowTag::new(
            SliceDate {
                year: 2020,
                month: 3,
                day: 7,
            },
            "precip",
            0,
        );

        let rows = tag(&[stats.clone(), stats], &tag_values);
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.date, "3/7/2020");
            assert_eq!(row.year, "2020");
            assert_eq!(row.month, "3");
            assert_eq!(row.day, "7");
            assert_eq!(row.variable, "precip");
            assert_eq!(row.level, 0);
            assert_eq!(row.sum, 24.0);
        }
    }
}
