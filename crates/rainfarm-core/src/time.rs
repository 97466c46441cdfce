/// Time axes of a downscaling request.
///
/// All four sequences share an anchor one native step before `start`; the
/// anchor itself is never emitted and every sequence ends exactly on `end`.
/// Only fixed-length `TimeDelta` arithmetic is used, no calendar logic.
use chrono::{NaiveDateTime, TimeDelta};

use crate::error::{RainfarmError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSchedule {
    native: Vec<NaiveDateTime>,
    reliable: Vec<NaiveDateTime>,
    fine: Vec<NaiveDateTime>,
    output: Vec<NaiveDateTime>,
    native_step: TimeDelta,
    ratio_t: usize,
    ct_sf: usize,
    output_stride: usize,
}

impl TimeSchedule {
    /// Build the native, reliable, fine and output sequences.
    ///
    /// `output_stride` is the number of fine steps per output step.
    pub fn new(
        start: NaiveDateTime,
        end: NaiveDateTime,
        native_step: TimeDelta,
        ct_sf: usize,
        ratio_t: usize,
        output_stride: usize,
    ) -> Result<Self> {
        if end < start {
            return Err(RainfarmError::config(format!(
                "schedule end {end} is before start {start}"
            )));
        }
        if native_step <= TimeDelta::zero() {
            return Err(RainfarmError::config(format!(
                "native time step must be positive, got {native_step}"
            )));
        }
        if ct_sf == 0 || ratio_t == 0 || output_stride == 0 {
            return Err(RainfarmError::config(format!(
                "time ratios must be >= 1 (ct_sf={ct_sf}, ratio_t={ratio_t}, stride={output_stride})"
            )));
        }

        let step_ns = nanos(native_step)?;
        let span_ns = nanos(end - start)?;
        if span_ns % step_ns != 0 {
            return Err(RainfarmError::config(format!(
                "span {} is not a multiple of the native step {native_step}",
                end - start
            )));
        }
        if step_ns % ratio_t as i64 != 0 {
            return Err(RainfarmError::config(format!(
                "native step {native_step} cannot be divided into {ratio_t} fine steps"
            )));
        }

        let native_len = (span_ns / step_ns) as usize + 1;
        if native_len % ct_sf != 0 {
            return Err(RainfarmError::config(format!(
                "{native_len} native steps cannot be grouped by ct_sf={ct_sf}"
            )));
        }
        let fine_len = native_len * ratio_t;
        if fine_len % output_stride != 0 {
            return Err(RainfarmError::config(format!(
                "{fine_len} fine steps cannot be grouped by an output stride of {output_stride}"
            )));
        }

        let anchor = shift(start, -step_ns)?;
        let fine_step = step_ns / ratio_t as i64;
        Ok(Self {
            native: sequence(anchor, step_ns, native_len)?,
            reliable: sequence(anchor, step_ns * ct_sf as i64, native_len / ct_sf)?,
            fine: sequence(anchor, fine_step, fine_len)?,
            output: sequence(anchor, fine_step * output_stride as i64, fine_len / output_stride)?,
            native_step,
            ratio_t,
            ct_sf,
            output_stride,
        })
    }

    pub fn native(&self) -> &[NaiveDateTime] {
        &self.native
    }

    pub fn reliable(&self) -> &[NaiveDateTime] {
        &self.reliable
    }

    pub fn fine(&self) -> &[NaiveDateTime] {
        &self.fine
    }

    pub fn output(&self) -> &[NaiveDateTime] {
        &self.output
    }

    pub fn native_step(&self) -> TimeDelta {
        self.native_step
    }

    pub fn fine_step(&self) -> TimeDelta {
        self.native_step / self.ratio_t as i32
    }

    pub fn output_step(&self) -> TimeDelta {
        self.fine_step() * self.output_stride as i32
    }

    pub fn ratio_t(&self) -> usize {
        self.ratio_t
    }

    pub fn ct_sf(&self) -> usize {
        self.ct_sf
    }

    pub fn output_stride(&self) -> usize {
        self.output_stride
    }
}

fn nanos(d: TimeDelta) -> Result<i64> {
    d.num_nanoseconds()
        .ok_or_else(|| RainfarmError::config(format!("time span {d} is out of range")))
}

fn shift(t: NaiveDateTime, by_ns: i64) -> Result<NaiveDateTime> {
    t.checked_add_signed(TimeDelta::nanoseconds(by_ns))
        .ok_or_else(|| RainfarmError::config(format!("timestamp {t} overflows")))
}

/// `anchor + k * step` for `k = 1..=len`.
fn sequence(anchor: NaiveDateTime, step_ns: i64, len: usize) -> Result<Vec<NaiveDateTime>> {
    (1..=len as i64)
        .map(|k| shift(anchor, k * step_ns))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    // -- Lengths and anchoring --

    #[test]
    fn daily_to_six_hourly() {
        let s = TimeSchedule::new(at(1, 0), at(4, 0), TimeDelta::days(1), 2, 4, 1).unwrap();
        assert_eq!(s.native().len(), 4);
        assert_eq!(s.fine().len(), 16);
        assert_eq!(s.reliable().len(), 2);
        assert_eq!(s.output().len(), 16);
        assert_eq!(s.native()[0], at(1, 0));
        assert_eq!(*s.native().last().unwrap(), at(4, 0));
        // anchored one native step before start
        assert_eq!(s.fine()[0], at(1, 0) - TimeDelta::days(1) + TimeDelta::hours(6));
        assert_eq!(*s.fine().last().unwrap(), at(4, 0));
        assert_eq!(s.reliable()[0], at(2, 0));
        assert_eq!(s.fine_step(), TimeDelta::hours(6));
    }

    #[test]
    fn output_stride_groups_fine_steps() {
        let s = TimeSchedule::new(at(1, 0), at(2, 0), TimeDelta::days(1), 1, 4, 2).unwrap();
        assert_eq!(s.fine().len(), 8);
        assert_eq!(s.output().len(), 4);
        assert_eq!(s.output_step(), TimeDelta::hours(12));
        assert_eq!(*s.output().last().unwrap(), at(2, 0));
        assert_eq!(s.fine().len() % s.output().len(), 0);
    }

    #[test]
    fn single_step_request() {
        let s = TimeSchedule::new(at(5, 0), at(5, 0), TimeDelta::hours(3), 1, 3, 1).unwrap();
        assert_eq!(s.native(), &[at(5, 0)]);
        assert_eq!(s.fine(), &[at(4, 22), at(4, 23), at(5, 0)]);
    }

    // -- Validation --

    #[test]
    fn rejects_end_before_start() {
        assert!(TimeSchedule::new(at(3, 0), at(1, 0), TimeDelta::days(1), 1, 1, 1).is_err());
    }

    #[test]
    fn rejects_non_positive_step() {
        assert!(TimeSchedule::new(at(1, 0), at(3, 0), TimeDelta::zero(), 1, 1, 1).is_err());
    }

    #[test]
    fn rejects_misaligned_span() {
        assert!(TimeSchedule::new(at(1, 0), at(2, 5), TimeDelta::days(1), 1, 1, 1).is_err());
    }

    #[test]
    fn rejects_indivisible_reliable_scale() {
        let err = TimeSchedule::new(at(1, 0), at(3, 0), TimeDelta::days(1), 2, 1, 1).unwrap_err();
        assert!(err.to_string().contains("ct_sf"));
    }

    #[test]
    fn rejects_bad_output_stride() {
        assert!(TimeSchedule::new(at(1, 0), at(1, 0), TimeDelta::days(1), 1, 4, 3).is_err());
    }

    #[test]
    fn rejects_zero_ratio() {
        assert!(TimeSchedule::new(at(1, 0), at(2, 0), TimeDelta::days(1), 1, 0, 1).is_err());
    }
}
