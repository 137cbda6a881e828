use chrono::{DateTime, Utc};

use crate::model::{CardProgress, ProgressDelta};

/// Correct answers needed before a card counts as mastered.
pub const MASTERY_THRESHOLD: u32 = 3;

/// Fixed-threshold mastery rule.
///
/// A card is mastered once it has been answered correctly `threshold` times
/// in total. Misses never reduce `correct`, so mastery does not decay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasteryRule {
    threshold: u32,
}

impl Default for MasteryRule {
    fn default() -> Self {
        Self {
            threshold: MASTERY_THRESHOLD,
        }
    }
}

impl MasteryRule {
    /// Builds a rule with a custom threshold. A zero threshold is raised to 1.
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    #[must_use]
    pub fn is_mastered(&self, correct: u32) -> bool {
        correct >= self.threshold
    }

    /// Applies one answer to the existing row (or a zeroed row when absent).
    #[must_use]
    pub fn apply(
        &self,
        existing: Option<&CardProgress>,
        correct: bool,
        now: DateTime<Utc>,
    ) -> CardProgress {
        self.apply_delta(existing, ProgressDelta::for_answer(correct), now)
    }

    #[must_use]
    pub fn apply_delta(
        &self,
        existing: Option<&CardProgress>,
        delta: ProgressDelta,
        now: DateTime<Utc>,
    ) -> CardProgress {
        let (correct, incorrect) = existing.map_or((0, 0), |p| (p.correct, p.incorrect));
        let correct = correct.saturating_add(delta.correct);
        let incorrect = incorrect.saturating_add(delta.incorrect);

        CardProgress {
            correct,
            incorrect,
            last_seen: now,
            mastered: self.is_mastered(correct),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn first_attempt_starts_from_zero() {
        let rule = MasteryRule::default();
        let p = rule.apply(None, true, fixed_now());
        assert_eq!((p.correct, p.incorrect, p.mastered), (1, 0, false));
        assert_eq!(p.last_seen, fixed_now());

        let p = rule.apply(None, false, fixed_now());
        assert_eq!((p.correct, p.incorrect, p.mastered), (0, 1, false));
    }

    #[test]
    fn mastery_flips_on_third_correct_and_survives_misses() {
        let rule = MasteryRule::default();
        let mut now = fixed_now();
        let mut p = rule.apply(None, true, now);
        for _ in 0..2 {
            now += Duration::minutes(1);
            p = rule.apply(Some(&p), true, now);
        }
        assert_eq!((p.correct, p.incorrect, p.mastered), (3, 0, true));

        now += Duration::minutes(1);
        p = rule.apply(Some(&p), false, now);
        assert_eq!((p.correct, p.incorrect, p.mastered), (3, 1, true));
        assert_eq!(p.last_seen, now);
    }

    #[test]
    fn mastery_tracks_first_crossing_for_any_sequence() {
        let rule = MasteryRule::default();
        let answers = [false, true, false, false, true, false, true, false, true];
        let mut p: Option<CardProgress> = None;
        let mut correct_so_far = 0;
        for answer in answers {
            if answer {
                correct_so_far += 1;
            }
            let next = rule.apply(p.as_ref(), answer, fixed_now());
            assert_eq!(next.mastered, correct_so_far >= MASTERY_THRESHOLD);
            if let Some(prev) = &p {
                assert!(next.correct >= prev.correct);
                assert!(!prev.mastered || next.mastered);
            }
            p = Some(next);
        }
    }

    #[test]
    fn custom_threshold_is_respected() {
        let rule = MasteryRule::new(1);
        assert!(rule.apply(None, true, fixed_now()).mastered);
        assert_eq!(MasteryRule::new(0).threshold(), 1);
    }
}
