//! Artifact mask: operator-edited annotations over the cropped recording.
//!
//! ```text
//! onset,duration,description
//! 12.5,1.25,BAD_blink
//! 300.0,4.0,BAD_movement
//! 410.2,0.0,note
//! ```
//!
//! Onsets are seconds from the crop start.  Annotations whose description
//! starts with `BAD` reject every epoch they overlap.
use std::path::Path;

use anyhow::{bail, Context, Result};

const HEADER: &str = "onset,duration,description";

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub onset: f64,
    pub duration: f64,
    pub description: String,
}

impl Annotation {
    pub fn is_bad(&self) -> bool {
        self.description.starts_with("BAD")
    }

    /// Closed-interval overlap with `[start, stop]`.
    pub fn overlaps(&self, start: f64, stop: f64) -> bool {
        self.onset <= stop && self.onset + self.duration >= start
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    pub items: Vec<Annotation>,
}

impl Annotations {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn n_bad(&self) -> usize {
        self.items.iter().filter(|a| a.is_bad()).count()
    }

    /// Whether any BAD annotation touches `[start, stop]` (seconds).
    pub fn rejects(&self, start: f64, stop: f64) -> bool {
        self.items.iter().any(|a| a.is_bad() && a.overlaps(start, stop))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut items = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || (lineno == 0 && line == HEADER) {
                continue;
            }
            let mut fields = line.splitn(3, ',');
            let (Some(onset), Some(duration)) = (fields.next(), fields.next()) else {
                bail!("line {}: expected onset,duration,description", lineno + 1);
            };
            let onset: f64 = onset.trim().parse().with_context(|| format!("line {}: onset", lineno + 1))?;
            let duration: f64 =
                duration.trim().parse().with_context(|| format!("line {}: duration", lineno + 1))?;
            if duration < 0.0 {
                bail!("line {}: negative duration {duration}", lineno + 1);
            }
            items.push(Annotation {
                onset,
                duration,
                description: fields.next().unwrap_or("").trim().to_string(),
            });
        }
        Ok(Self { items })
    }

    pub fn to_csv(&self) -> String {
        let mut out = format!("{HEADER}\n");
        for a in &self.items {
            out.push_str(&format!("{},{},{}\n", a.onset, a.duration, a.description));
        }
        out
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Load `path`, or an empty mask when it does not exist.
    pub fn load_or_empty(path: &Path) -> Result<Self> {
        if path.exists() { Self::load(path) } else { Ok(Self::default()) }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_csv()).with_context(|| format!("writing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_header_and_comments() {
        let a = Annotations::parse("onset,duration,description\n# eyes\n1.5,0.5,BAD_blink\n3,0,note, with comma\n")
            .unwrap();
        assert_eq!(a.items.len(), 2);
        assert_eq!(a.items[1].description, "note, with comma");
        assert_eq!(a.n_bad(), 1);
    }

    #[test]
    fn only_bad_annotations_reject() {
        let a = Annotations::parse("1.0,1.0,BAD_x\n5.0,1.0,good\n").unwrap();
        assert!(a.rejects(1.9, 2.5));
        assert!(a.rejects(0.0, 1.0));
        assert!(!a.rejects(2.01, 3.0));
        assert!(!a.rejects(5.0, 5.5));
    }

    #[test]
    fn csv_text_reparses() {
        let a = Annotations::parse("0.25,2,BAD_movement\n").unwrap();
        assert_eq!(Annotations::parse(&a.to_csv()).unwrap(), a);
    }

    #[test]
    fn malformed_rows_rejected() {
        assert!(Annotations::parse("abc,1,BAD").is_err());
        assert!(Annotations::parse("1.0").is_err());
        assert!(Annotations::parse("1.0,-2,BAD").is_err());
    }
}
