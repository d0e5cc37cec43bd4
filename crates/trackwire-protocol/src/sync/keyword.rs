use super::{Frame, FrameKind, Framer, SyncCounts, SyncState};

/// Longest line body kept by default.
pub const DEFAULT_MAX_LINE: usize = 8192;

/// Line tags of the ASCII tracker output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsciiTag {
    /// `fr`: frame counter.
    Frame,
    /// `ts`: timestamp in seconds.
    Timestamp,
    /// `6dcal`: number of calibrated bodies.
    Calibration,
    /// `3d`: markers.
    Marker3d,
    /// `6d`: standard bodies.
    Body6d,
    /// `6df`: flysticks.
    Flystick,
    /// `6df2`: flysticks with controller words.
    Flystick2,
    /// `6dmt`: measurement tools.
    MeasurementTool,
    /// `gl`: hands.
    Glove,
}

impl AsciiTag {
    pub const fn as_str(self) -> &'static str {
        match self {
            AsciiTag::Frame => "fr",
            AsciiTag::Timestamp => "ts",
            AsciiTag::Calibration => "6dcal",
            AsciiTag::Marker3d => "3d",
            AsciiTag::Body6d => "6d",
            AsciiTag::Flystick => "6df",
            AsciiTag::Flystick2 => "6df2",
            AsciiTag::MeasurementTool => "6dmt",
            AsciiTag::Glove => "gl",
        }
    }
}

struct TrieNode {
    tag: Option<AsciiTag>,
    edges: &'static [(u8, u8)],
}

const ROOT: u8 = 0;

#[rustfmt::skip]
static TRIE: [TrieNode; 18] = [
    /* 0  ""      */ TrieNode { tag: None, edges: &[(b'f', 1), (b't', 3), (b'6', 5), (b'g', 12), (b'3', 14)] },
    /* 1  "f"     */ TrieNode { tag: None, edges: &[(b'r', 2)] },
    /* 2  "fr"    */ TrieNode { tag: Some(AsciiTag::Frame), edges: &[] },
    /* 3  "t"     */ TrieNode { tag: None, edges: &[(b's', 4)] },
    /* 4  "ts"    */ TrieNode { tag: Some(AsciiTag::Timestamp), edges: &[] },
    /* 5  "6"     */ TrieNode { tag: None, edges: &[(b'd', 6)] },
    /* 6  "6d"    */ TrieNode { tag: Some(AsciiTag::Body6d), edges: &[(b'c', 7), (b'f', 10), (b'm', 16)] },
    /* 7  "6dc"   */ TrieNode { tag: None, edges: &[(b'a', 8)] },
    /* 8  "6dca"  */ TrieNode { tag: None, edges: &[(b'l', 9)] },
    /* 9  "6dcal" */ TrieNode { tag: Some(AsciiTag::Calibration), edges: &[] },
    /* 10 "6df"   */ TrieNode { tag: Some(AsciiTag::Flystick), edges: &[(b'2', 11)] },
    /* 11 "6df2"  */ TrieNode { tag: Some(AsciiTag::Flystick2), edges: &[] },
    /* 12 "g"     */ TrieNode { tag: None, edges: &[(b'l', 13)] },
    /* 13 "gl"    */ TrieNode { tag: Some(AsciiTag::Glove), edges: &[] },
    /* 14 "3"     */ TrieNode { tag: None, edges: &[(b'd', 15)] },
    /* 15 "3d"    */ TrieNode { tag: Some(AsciiTag::Marker3d), edges: &[] },
    /* 16 "6dm"   */ TrieNode { tag: None, edges: &[(b't', 17)] },
    /* 17 "6dmt"  */ TrieNode { tag: Some(AsciiTag::MeasurementTool), edges: &[] },
];

fn step(node: u8, byte: u8) -> Option<u8> {
    let byte = byte.to_ascii_lowercase();
    TRIE.get(usize::from(node))?
        .edges
        .iter()
        .find(|(c, _)| *c == byte)
        .map(|&(_, next)| next)
}

fn complete(node: u8) -> Option<AsciiTag> {
    TRIE.get(usize::from(node)).and_then(|n| n.tag)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Matcher {
    /// At a word boundary.
    Idle,
    /// Inside a word that is still a prefix of some tag.
    Partial(u8),
    /// Inside a word that can no longer be a tag.
    InWord,
    /// Collecting the rest of a tagged line.
    Body(AsciiTag),
    /// Dropping the rest of an overlong line.
    Discard,
}

/// Splits ASCII tracker output into tagged line bodies.
///
/// Tags are matched case-insensitively and only at word boundaries; a tag
/// that is a prefix of a longer one (`6d`, `6df`) is only accepted once a
/// non-alphanumeric character follows. The body runs to `\n`; a trailing
/// `\r` is dropped. A line whose body outgrows the limit is dropped up to
/// its `\n`, so nothing in its tail is taken for a tag.
#[derive(Debug)]
pub struct KeywordFramer {
    matcher: Matcher,
    body: Vec<u8>,
    ready: Option<AsciiTag>,
    max_line: usize,
    sync: SyncState,
    counts: SyncCounts,
}

impl Default for KeywordFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE)
    }
}

impl KeywordFramer {
    pub fn new(max_line: usize) -> Self {
        Self {
            matcher: Matcher::Idle,
            body: Vec::with_capacity(max_line.min(DEFAULT_MAX_LINE)),
            ready: None,
            max_line,
            sync: SyncState::Resyncing,
            counts: SyncCounts::default(),
        }
    }

    fn lose_sync(&mut self) {
        if self.sync == SyncState::Synchronized {
            self.sync = SyncState::Resyncing;
            self.counts.resyncs += 1;
            tracing::trace!("ascii framer lost sync");
        }
    }

    fn start_word(&mut self, byte: u8) {
        self.matcher = match step(ROOT, byte) {
            Some(node) => Matcher::Partial(node),
            None => {
                self.lose_sync();
                Matcher::InWord
            }
        };
    }

    fn finish_line(&mut self, tag: AsciiTag) -> bool {
        if self.body.last() == Some(&b'\r') {
            self.body.pop();
        }
        self.matcher = Matcher::Idle;
        self.ready = Some(tag);
        self.sync = SyncState::Synchronized;
        true
    }
}

impl Framer for KeywordFramer {
    fn push(&mut self, byte: u8) -> bool {
        self.ready = None;
        match self.matcher {
            Matcher::Body(tag) => {
                if byte == b'\n' {
                    return self.finish_line(tag);
                }
                if self.body.len() >= self.max_line {
                    tracing::trace!(tag = tag.as_str(), "discarding overlong line");
                    self.body.clear();
                    self.matcher = Matcher::Discard;
                    self.lose_sync();
                    return false;
                }
                self.body.push(byte);
                false
            }
            Matcher::Discard => {
                if byte == b'\n' {
                    self.matcher = Matcher::Idle;
                }
                false
            }
            Matcher::Idle | Matcher::InWord if !byte.is_ascii_alphanumeric() => {
                self.matcher = Matcher::Idle;
                false
            }
            Matcher::Idle => {
                self.start_word(byte);
                false
            }
            Matcher::InWord => false,
            Matcher::Partial(node) if byte.is_ascii_alphanumeric() => {
                self.matcher = match step(node, byte) {
                    Some(next) => Matcher::Partial(next),
                    None => {
                        self.lose_sync();
                        Matcher::InWord
                    }
                };
                false
            }
            Matcher::Partial(node) => match complete(node) {
                Some(tag) => {
                    self.body.clear();
                    if byte == b'\n' {
                        self.finish_line(tag)
                    } else {
                        self.matcher = Matcher::Body(tag);
                        false
                    }
                }
                None => {
                    self.lose_sync();
                    self.matcher = Matcher::Idle;
                    false
                }
            },
        }
    }

    fn frame(&self) -> Frame<'_> {
        Frame {
            kind: FrameKind::Line(self.ready.unwrap_or(AsciiTag::Frame)),
            bytes: &self.body,
        }
    }

    fn state(&self) -> SyncState {
        self.sync
    }

    fn resync(&mut self) {
        self.body.clear();
        self.matcher = Matcher::Idle;
        self.ready = None;
        self.lose_sync();
    }

    fn take_counts(&mut self) -> SyncCounts {
        std::mem::take(&mut self.counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::feed;

    fn lines(framer: &mut KeywordFramer, input: &[u8]) -> Vec<(AsciiTag, String)> {
        let mut out = Vec::new();
        let mut pos = 0;
        while let Some(frame) = feed(framer, input, &mut pos) {
            if let FrameKind::Line(tag) = frame.kind {
                out.push((tag, String::from_utf8_lossy(frame.bytes).into_owned()));
            }
        }
        out
    }

    #[test]
    fn test_splits_tagged_lines() {
        let mut f = KeywordFramer::default();
        let got = lines(&mut f, b"fr 10\r\n6d 0\r\n6df 1 [0 1.0 3]\n");
        assert_eq!(
            got,
            vec![
                (AsciiTag::Frame, "10".to_string()),
                (AsciiTag::Body6d, "0".to_string()),
                (AsciiTag::Flystick, "1 [0 1.0 3]".to_string()),
            ]
        );
        assert_eq!(f.state(), SyncState::Synchronized);
    }

    #[test]
    fn test_prefix_tags_need_boundary() {
        let mut f = KeywordFramer::default();
        let got = lines(&mut f, b"6df2 1 2\n6dcal 4\n6dmt 0\n");
        let tags: Vec<_> = got.iter().map(|(t, _)| *t).collect();
        assert_eq!(
            tags,
            vec![AsciiTag::Flystick2, AsciiTag::Calibration, AsciiTag::MeasurementTool]
        );
    }

    #[test]
    fn test_tags_are_case_insensitive() {
        let mut f = KeywordFramer::default();
        let got = lines(&mut f, b"FR 1\nGl 0\n");
        assert_eq!(got[0].0, AsciiTag::Frame);
        assert_eq!(got[1].0, AsciiTag::Glove);
    }

    #[test]
    fn test_words_that_extend_a_tag_are_not_tags() {
        let mut f = KeywordFramer::default();
        let got = lines(&mut f, b"frame 1\n6dx 2\n6dfoo 3\nxfr 4\nfr 5\n");
        assert_eq!(got, vec![(AsciiTag::Frame, "5".to_string())]);
    }

    #[test]
    fn test_garbage_prefix_then_recovery() {
        let mut f = KeywordFramer::default();
        let got = lines(&mut f, b"#@! ~ zz 12.5]\n3d 1 [1 1.0][0 0 0]\n");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, AsciiTag::Marker3d);
    }

    #[test]
    fn test_bare_tag_line_yields_empty_body() {
        let mut f = KeywordFramer::default();
        let got = lines(&mut f, b"ts\n");
        assert_eq!(got, vec![(AsciiTag::Timestamp, String::new())]);
    }

    #[test]
    fn test_overlong_body_is_discarded() {
        let mut f = KeywordFramer::new(8);
        let got = lines(&mut f, b"fr 1\n6d 0123456789012\nfr 2\n");
        assert_eq!(
            got,
            vec![
                (AsciiTag::Frame, "1".to_string()),
                (AsciiTag::Frame, "2".to_string()),
            ]
        );
        assert_eq!(f.take_counts().resyncs, 1);
        assert_eq!(f.take_counts(), SyncCounts::default());
    }

    #[test]
    fn test_tail_of_overlong_line_is_not_scanned_for_tags() {
        let mut f = KeywordFramer::new(8);
        let got = lines(&mut f, b"6d 0123456789 fr 7 6d 1
fr 2
");
        assert_eq!(got, vec![(AsciiTag::Frame, "2".to_string())]);
        assert_eq!(f.state(), SyncState::Synchronized);
    }

    #[test]
    fn test_partial_line_carries_over_between_feeds() {
        let mut f = KeywordFramer::default();
        assert!(lines(&mut f, b"fr 4").is_empty());
        assert_eq!(lines(&mut f, b"2\n"), vec![(AsciiTag::Frame, "42".to_string())]);
    }
}
