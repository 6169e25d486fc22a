//! User bookmarks and their TSV import/export.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::EnvelopeId;
use crate::remote::EnvelopeReport;

/// Header row written by [`BookmarkList::export_tsv`].
pub const EXPORT_HEADER: &str = "label\tmz\trt\n";

/// Header row written by [`BookmarkList::report`].
pub const REPORT_HEADER: &str =
    "label\tmz\trt\tintensity\ttrace0_mz\ttrace0_intensity\ttrace1_mz\ttrace1_intensity\t...\n";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookmarkError {
    #[error("bookmark index {index} out of range (have {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// A named location, optionally paired with an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub name: String,
    pub mz: f64,
    #[serde(default)]
    pub rt: Option<f64>,
    #[serde(default)]
    pub envelope: Option<EnvelopeId>,
}

impl Bookmark {
    pub fn new(name: impl Into<String>, mz: f64, rt: Option<f64>) -> Self {
        Self {
            name: name.into(),
            mz,
            rt,
            envelope: None,
        }
    }
}

/// Ordered bookmarks with a cursor for next/previous navigation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmarkList {
    list: Vec<Bookmark>,
    #[serde(skip)]
    current: Option<usize>,
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn format_rt(rt: Option<f64>) -> String {
    rt.map(|rt| rt.to_string()).unwrap_or_default()
}

impl BookmarkList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(list: Vec<Bookmark>) -> Self {
        Self {
            list,
            current: None,
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Bookmark> {
        self.list.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bookmark> {
        self.list.iter()
    }

    pub fn add(&mut self, bookmark: Bookmark) {
        log::debug!("🔖 Bookmark added: {}", bookmark.name);
        self.list.push(bookmark);
    }

    /// Remove by position, keeping the cursor on the same bookmark.
    /// Removing the current bookmark clears the cursor.
    pub fn remove(&mut self, index: usize) -> Result<Bookmark, BookmarkError> {
        if index >= self.list.len() {
            return Err(BookmarkError::IndexOutOfRange {
                index,
                len: self.list.len(),
            });
        }
        self.current = match self.current {
            Some(c) if index < c => Some(c - 1),
            Some(c) if index == c => None,
            other => other,
        };
        Ok(self.list.remove(index))
    }

    pub fn remove_all(&mut self) -> Vec<Bookmark> {
        self.current = None;
        std::mem::take(&mut self.list)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&Bookmark> {
        self.current.and_then(|i| self.list.get(i))
    }

    pub fn set_current(&mut self, index: usize) -> Result<(), BookmarkError> {
        if index >= self.list.len() {
            return Err(BookmarkError::IndexOutOfRange {
                index,
                len: self.list.len(),
            });
        }
        self.current = Some(index);
        Ok(())
    }

    /// Advance the cursor, wrapping to the start.
    pub fn next(&mut self) -> Option<&Bookmark> {
        if self.list.is_empty() {
            return None;
        }
        let next = self.current.map_or(0, |c| c + 1);
        self.current = Some(if next >= self.list.len() { 0 } else { next });
        self.current()
    }

    /// Step the cursor back, wrapping to the end.
    pub fn previous(&mut self) -> Option<&Bookmark> {
        if self.list.is_empty() {
            return None;
        }
        self.current = Some(match self.current {
            Some(c) if c > 0 => c - 1,
            _ => self.list.len() - 1,
        });
        self.current()
    }

    /// Pair (or unpair with `None`) the current bookmark. Returns false when
    /// there is no current bookmark.
    pub fn set_pair(&mut self, envelope: Option<EnvelopeId>) -> bool {
        match self.current.and_then(|i| self.list.get_mut(i)) {
            Some(bookmark) => {
                bookmark.envelope = envelope;
                log::debug!("🔖 Bookmark '{}' paired with {:?}", bookmark.name, envelope);
                true
            }
            None => false,
        }
    }

    /// Envelope paired with the current bookmark.
    pub fn current_pair(&self) -> Option<EnvelopeId> {
        self.current().and_then(|b| b.envelope)
    }

    /// Paired envelope ids in list order, for a report request.
    pub fn paired_envelopes(&self) -> Vec<EnvelopeId> {
        self.list.iter().filter_map(|b| b.envelope).collect()
    }

    /// Replace the list with bookmarks parsed from `name\tmz\trt` lines.
    ///
    /// Lines without exactly three fields or with a non-numeric mz (such as
    /// a header) are skipped. A blank or non-numeric rt becomes `None`.
    /// Returns the number of bookmarks imported.
    pub fn import_tsv(&mut self, data: &str) -> usize {
        self.remove_all();
        for (line_no, line) in data.lines().enumerate() {
            let parts: Vec<&str> = line.split('\t').collect();
            let [name, mz, rt] = parts.as_slice() else {
                continue;
            };
            let Ok(mz) = mz.trim().parse::<f64>() else {
                log::debug!("Skipping bookmark line {}: bad mz", line_no + 1);
                continue;
            };
            if !mz.is_finite() {
                continue;
            }
            let rt = rt
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|rt| rt.is_finite())
                .map(round3);
            self.list.push(Bookmark::new(*name, round3(mz), rt));
        }
        log::info!("Imported {} bookmarks", self.list.len());
        self.list.len()
    }

    /// `label\tmz\trt` with a header row. Runs of whitespace in names
    /// become a single space.
    pub fn export_tsv(&self) -> String {
        let mut out = String::from(EXPORT_HEADER);
        for bookmark in &self.list {
            let name = bookmark.name.split_whitespace().collect::<Vec<_>>().join(" ");
            out.push_str(&format!(
                "{}\t{}\t{}\n",
                name,
                bookmark.mz,
                format_rt(bookmark.rt)
            ));
        }
        out
    }

    /// One row per paired bookmark whose envelope the server knows.
    pub fn report(&self, envelopes: &EnvelopeReport) -> String {
        let mut out = String::from(REPORT_HEADER);
        for bookmark in &self.list {
            let Some(env) = bookmark.envelope else {
                continue;
            };
            let Some(Some(info)) = envelopes.get(&env) else {
                continue;
            };
            out.push_str(&format!(
                "{}\t{}\t{}\t{}",
                bookmark.name,
                info.mz(),
                info.rt(),
                info.intensity()
            ));
            for (mz, intensity) in info.traces() {
                out.push_str(&format!("\t{mz}\t{intensity}"));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::EnvelopeInfo;

    fn three() -> BookmarkList {
        BookmarkList::from_vec(vec![
            Bookmark::new("a", 100.0, Some(1.0)),
            Bookmark::new("b", 200.0, None),
            Bookmark::new("c", 300.0, Some(3.0)),
        ])
    }

    #[test]
    fn test_next_and_previous_wrap() {
        let mut list = three();
        assert_eq!(list.next().map(|b| b.name.as_str()), Some("a"));
        list.next();
        assert_eq!(list.next().map(|b| b.name.as_str()), Some("c"));
        assert_eq!(list.next().map(|b| b.name.as_str()), Some("a"));
        assert_eq!(list.previous().map(|b| b.name.as_str()), Some("c"));
    }

    #[test]
    fn test_empty_navigation() {
        let mut list = BookmarkList::new();
        assert!(list.next().is_none());
        assert!(list.previous().is_none());
        assert!(list.current().is_none());
    }

    #[test]
    fn test_remove_adjusts_cursor() {
        let mut list = three();
        list.set_current(2).unwrap();
        list.remove(0).unwrap();
        assert_eq!(list.current().map(|b| b.name.as_str()), Some("c"));
        list.remove(1).unwrap();
        assert!(list.current().is_none());
        assert_eq!(
            list.remove(5),
            Err(BookmarkError::IndexOutOfRange { index: 5, len: 1 })
        );
    }

    #[test]
    fn test_import_skips_header_and_rounds() {
        let mut list = three();
        let n = list.import_tsv("label\tmz\trt\nfirst\t412.12345\t18.9999\nsecond\t500\t\nbad line\nx\tnope\t3\n");
        assert_eq!(n, 2);
        assert_eq!(list.get(0), Some(&Bookmark::new("first", 412.123, Some(19.0))));
        assert_eq!(list.get(1).and_then(|b| b.rt), None);
        assert!(list.current().is_none());
    }

    #[test]
    fn test_export_collapses_whitespace() {
        let list = BookmarkList::from_vec(vec![
            Bookmark::new("two  words\there", 100.5, Some(2.25)),
            Bookmark::new("no rt", 7.0, None),
        ]);
        assert_eq!(
            list.export_tsv(),
            "label\tmz\trt\ntwo words here\t100.5\t2.25\nno rt\t7\t\n"
        );
    }

    #[test]
    fn test_export_then_import_keeps_bookmarks() {
        let list = three();
        let mut copy = BookmarkList::new();
        copy.import_tsv(&list.export_tsv());
        assert_eq!(copy.iter().collect::<Vec<_>>(), list.iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_pairing_and_report() {
        let mut list = three();
        assert!(!list.set_pair(Some(4)));
        list.set_current(0).unwrap();
        assert!(list.set_pair(Some(4)));
        list.set_current(2).unwrap();
        list.set_pair(Some(9));
        assert_eq!(list.paired_envelopes(), vec![4, 9]);
        assert_eq!(list.current_pair(), Some(9));

        let report = EnvelopeReport::from([
            (4, Some(EnvelopeInfo(100.1, 1.5, 2000.0, vec![(100.1, 2000.0), (101.1, 800.0)]))),
            (9, None),
        ]);
        assert_eq!(
            list.report(&report),
            format!("{REPORT_HEADER}a\t100.1\t1.5\t2000\t100.1\t2000\t101.1\t800\n")
        );
    }
}
