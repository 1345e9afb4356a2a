//! Human-readable score breakdown. Observability only; never read back by
//! decision logic.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreTerm {
    pub label: &'static str,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    terms: Vec<ScoreTerm>,
}

impl ScoreBreakdown {
    pub(super) fn push(&mut self, label: &'static str, value: f64) {
        if value != 0.0 {
            self.terms.push(ScoreTerm { label, value });
        }
    }

    pub fn terms(&self) -> &[ScoreTerm] {
        &self.terms
    }

    pub fn total(&self) -> f64 {
        self.terms.iter().map(|t| t.value).sum()
    }
}

impl fmt::Display for ScoreBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if i == 0 {
                write!(f, "{}={:.0}", term.label, term.value)?;
            } else {
                write!(f, "{}={:+.0}", term.label, term.value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_terms_are_omitted_and_display_is_signed() {
        let mut b = ScoreBreakdown::default();
        b.push("quality_floor", 300.0);
        b.push("free_slot", 100.0);
        b.push("bpm", 0.0);
        b.push("queue", -5.0);
        assert_eq!(b.terms().len(), 3);
        assert_eq!(b.total(), 395.0);
        assert_eq!(b.to_string(), "quality_floor=300 free_slot=+100 queue=-5");
    }
}
