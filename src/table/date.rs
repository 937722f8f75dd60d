//! Timestamp properties, stored as `i64` since the Unix epoch.

use chrono_v0_4::{DateTime, Utc};

use super::builder::{FieldOffset, TableBuilder};
use super::reader::TableReader;
use crate::error::CodecError;

impl TableBuilder {
    /// Records a timestamp with millisecond precision.
    pub fn collect_date(
        &mut self,
        value: DateTime<Utc>,
        field: FieldOffset,
    ) -> Result<(), CodecError> {
        self.collect_scalar(value.timestamp_millis(), field)
    }

    /// Records a timestamp with nanosecond precision.
    ///
    /// Dates outside roughly 1677 to 2262 do not fit and are clamped to the nearest end.
    pub fn collect_date_nanos(
        &mut self,
        value: DateTime<Utc>,
        field: FieldOffset,
    ) -> Result<(), CodecError> {
        let nanos = value.timestamp_nanos_opt().unwrap_or(if value.timestamp() < 0 {
            i64::MIN
        } else {
            i64::MAX
        });
        self.collect_scalar(nanos, field)
    }
}

impl TableReader<'_> {
    /// Reads a millisecond timestamp.
    pub fn read_date(&self, field: FieldOffset) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.read_scalar::<i64>(field)?)
    }

    /// Reads a nanosecond timestamp.
    pub fn read_date_nanos(&self, field: FieldOffset) -> Option<DateTime<Utc>> {
        Some(DateTime::from_timestamp_nanos(self.read_scalar::<i64>(field)?))
    }
}

#[cfg(test)]
mod tests {
    use chrono_v0_4::TimeZone;

    use super::*;

    #[test]
    fn test_dates_round_trip() {
        let date = Utc.with_ymd_and_hms(2024, 2, 29, 12, 30, 15).unwrap();
        let precise = date + chrono_v0_4::Duration::nanoseconds(123_456_789);

        let mut builder = TableBuilder::new();
        builder.set_collecting(true);
        builder.collect_date(date, 4).unwrap();
        builder.collect_date_nanos(precise, 6).unwrap();
        let bytes = builder.finish().unwrap().to_vec();

        let reader = TableReader::get_root(&bytes);
        assert_eq!(reader.read_date(4), Some(date));
        assert_eq!(reader.read_date_nanos(6), Some(precise));
        assert_eq!(reader.read_scalar::<i64>(4), Some(date.timestamp_millis()));
        assert_eq!(reader.read_date(8), None);
    }

    #[test]
    fn test_out_of_range_nanos_saturate() {
        let far = Utc.with_ymd_and_hms(3000, 1, 1, 0, 0, 0).unwrap();

        let mut builder = TableBuilder::new();
        builder.set_collecting(true);
        builder.collect_date_nanos(far, 4).unwrap();
        let bytes = builder.finish().unwrap().to_vec();

        assert_eq!(
            TableReader::get_root(&bytes).read_scalar::<i64>(4),
            Some(i64::MAX)
        );
    }
}
