//! Monitoring window planning: picks random capture instants inside a
//! worker's working minutes.

use super::schedule::{BreakInterval, eligible_minutes, time_from_minute, validate_window};
use crate::error::{Result, ShiftpayError};
use chrono::NaiveTime;
use rand::Rng;
use rand::seq::SliceRandom;

/// Draws up to `target` distinct capture instants from the working window.
///
/// Eligible minutes are the minutes of `[start, end)` not covered by any
/// break. When there are no more eligible minutes than `target`, all of them
/// are returned. Otherwise `target` minutes are sampled uniformly without
/// replacement straight from the eligible set. The result is sorted ascending.
pub fn plan<R: Rng + ?Sized>(
    start: NaiveTime,
    end: NaiveTime,
    breaks: &[BreakInterval],
    target: usize,
    rng: &mut R,
) -> Result<Vec<NaiveTime>> {
    validate_window(start, end, breaks)?;

    let eligible = eligible_minutes(start, end, breaks);
    let mut drawn: Vec<u32> = if eligible.len() <= target {
        eligible
    } else {
        eligible.choose_multiple(rng, target).copied().collect()
    };
    drawn.sort_unstable();

    drawn
        .into_iter()
        .map(|m| {
            time_from_minute(m).ok_or_else(|| {
                ShiftpayError::Validation(format!("minute {m} is outside the day"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schedule::minute_of_day;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_plan_office_day_with_lunch() {
        let mut rng = StdRng::seed_from_u64(7);
        let lunch = [BreakInterval::new(t(12, 0), t(13, 0)).unwrap()];
        let instants = plan(t(9, 0), t(17, 0), &lunch, 10, &mut rng).unwrap();

        assert_eq!(instants.len(), 10);
        for at in &instants {
            let in_morning = *at >= t(9, 0) && *at < t(12, 0);
            let in_afternoon = *at >= t(13, 0) && *at < t(17, 0);
            assert!(in_morning || in_afternoon, "{at} is not a working minute");
        }
        assert!(instants.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_plan_properties_across_seeds() {
        let breaks = [
            BreakInterval::new(t(10, 0), t(10, 15)).unwrap(),
            BreakInterval::new(t(12, 30), t(13, 15)).unwrap(),
        ];
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let target = (seed % 40) as usize;
            let instants = plan(t(8, 0), t(14, 0), &breaks, target, &mut rng).unwrap();

            assert_eq!(instants.len(), target);
            let unique: HashSet<_> = instants.iter().collect();
            assert_eq!(unique.len(), instants.len());
            assert!(instants.windows(2).all(|w| w[0] < w[1]));
            for at in &instants {
                assert!(*at >= t(8, 0) && *at < t(14, 0));
                assert!(!breaks.iter().any(|b| b.contains(*at)));
            }
        }
    }

    #[test]
    fn test_plan_returns_all_minutes_when_window_is_small() {
        let mut rng = StdRng::seed_from_u64(1);
        let breaks = [BreakInterval::new(t(9, 2), t(9, 4)).unwrap()];
        let instants = plan(t(9, 0), t(9, 6), &breaks, 10, &mut rng).unwrap();

        assert_eq!(instants, vec![t(9, 0), t(9, 1), t(9, 4), t(9, 5)]);
    }

    #[test]
    fn test_plan_with_window_fully_on_break() {
        let mut rng = StdRng::seed_from_u64(1);
        let breaks = [BreakInterval::new(t(9, 0), t(10, 0)).unwrap()];
        let instants = plan(t(9, 0), t(10, 0), &breaks, 5, &mut rng).unwrap();
        assert!(instants.is_empty());
    }

    #[test]
    fn test_plan_zero_target() {
        let mut rng = StdRng::seed_from_u64(1);
        let instants = plan(t(9, 0), t(17, 0), &[], 0, &mut rng).unwrap();
        assert!(instants.is_empty());
    }

    #[test]
    fn test_plan_rejects_invalid_window() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            plan(t(17, 0), t(9, 0), &[], 10, &mut rng),
            Err(ShiftpayError::Validation(_))
        ));
        assert!(matches!(
            plan(t(9, 0), t(9, 0), &[], 10, &mut rng),
            Err(ShiftpayError::Validation(_))
        ));
    }

    #[test]
    fn test_plan_draws_are_not_biased_to_edges() {
        // Over many draws of a single instant every minute of a short window shows up.
        let mut seen = HashSet::new();
        for seed in 0..2000 {
            let mut rng = StdRng::seed_from_u64(seed);
            let instants = plan(t(9, 0), t(9, 20), &[], 1, &mut rng).unwrap();
            seen.insert(minute_of_day(instants[0]));
        }
        assert_eq!(seen.len(), 20);
    }
}
