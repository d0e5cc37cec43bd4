use super::{Frame, FrameKind, Framer, SyncCounts, SyncState};

/// Stations addressable by a single base-36 character.
pub const MAX_STATIONS: usize = 36;

/// Position and Euler angles, six little-endian `f32`s.
pub const STATION_POSE_LEN: usize = 24;

/// Most valuator bytes a station record carries.
pub const MAX_STATION_VALUATORS: u8 = 2;

const PREAMBLE_LEN: u8 = 5;

/// Extra fields a station appends after its pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StationLayout {
    pub buttons: bool,
    /// Valuator bytes, clamped to 2.
    pub valuators: u8,
}

impl StationLayout {
    pub fn new(buttons: bool, valuators: u8) -> Self {
        Self {
            buttons,
            valuators: valuators.min(MAX_STATION_VALUATORS),
        }
    }

    /// Body length following the preamble.
    pub fn body_len(&self) -> usize {
        STATION_POSE_LEN + usize::from(self.buttons) + usize::from(self.valuators)
    }
}

/// Configured layout of every station; the wire never carries lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationTable {
    layouts: [Option<StationLayout>; MAX_STATIONS],
}

impl Default for StationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StationTable {
    pub fn new() -> Self {
        Self {
            layouts: [None; MAX_STATIONS],
        }
    }

    /// Configure `station`; out-of-range stations are ignored.
    pub fn with_station(mut self, station: u8, layout: StationLayout) -> Self {
        if let Some(slot) = self.layouts.get_mut(usize::from(station)) {
            *slot = Some(layout);
        }
        self
    }

    pub fn layout(&self, station: u8) -> Option<StationLayout> {
        self.layouts.get(usize::from(station)).copied().flatten()
    }
}

/// Value of a base-36 station character.
pub fn station_from_char(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'Z' => Some(c - b'A' + 10),
        b'a'..=b'z' => Some(c - b'a' + 10),
        _ => None,
    }
}

/// Upper-case base-36 character for `station`.
pub fn station_to_char(station: u8) -> Option<u8> {
    match station {
        0..=9 => Some(b'0' + station),
        10..=35 => Some(b'A' + station - 10),
        _ => None,
    }
}

/// Locates station records behind the `\r \n '0' <station> <filler>`
/// preamble.
///
/// The preamble matcher has six states: 0 to 4 count matched preamble bytes,
/// 5 collects the body. A mismatching byte is re-evaluated from state 0.
/// After a record the next preamble must follow immediately; anything else
/// is a loss of sync.
#[derive(Debug)]
pub struct SentinelFramer {
    table: StationTable,
    matched: u8,
    station: u8,
    need: usize,
    body: Vec<u8>,
    sync: SyncState,
    counts: SyncCounts,
}

impl SentinelFramer {
    pub fn new(table: StationTable) -> Self {
        Self {
            table,
            matched: 0,
            station: 0,
            need: 0,
            body: Vec::with_capacity(STATION_POSE_LEN + 3),
            sync: SyncState::Resyncing,
            counts: SyncCounts::default(),
        }
    }

    pub fn table(&self) -> &StationTable {
        &self.table
    }

    fn lose_sync(&mut self) {
        if self.sync == SyncState::Synchronized {
            self.sync = SyncState::Resyncing;
            self.counts.resyncs += 1;
            tracing::trace!("station framer lost sync");
        }
    }

    /// Advance the preamble matcher; returns the new matched count.
    fn match_preamble(&mut self, state: u8, byte: u8) -> u8 {
        match (state, byte) {
            (0, b'\r') => 1,
            (1, b'\n') => 2,
            (2, b'0') => 3,
            (3, c) => match station_from_char(c) {
                Some(station) => {
                    self.station = station;
                    4
                }
                None => 0,
            },
            (4, c) if c == b' ' || c.is_ascii_alphabetic() => PREAMBLE_LEN,
            _ => 0,
        }
    }
}

impl Framer for SentinelFramer {
    fn push(&mut self, byte: u8) -> bool {
        if self.matched == PREAMBLE_LEN {
            self.body.push(byte);
            if self.body.len() < self.need {
                return false;
            }
            self.matched = 0;
            self.sync = SyncState::Synchronized;
            return true;
        }

        let mut next = self.match_preamble(self.matched, byte);
        if next == 0 && self.matched != 0 {
            self.lose_sync();
            next = self.match_preamble(0, byte);
        } else if next == 0 {
            self.lose_sync();
        }
        self.matched = next;

        if self.matched == PREAMBLE_LEN {
            match self.table.layout(self.station) {
                Some(layout) => {
                    self.need = layout.body_len();
                    self.body.clear();
                }
                None => {
                    tracing::trace!(station = self.station, "skipping unconfigured station");
                    self.counts.skipped += 1;
                    self.matched = 0;
                }
            }
        }
        false
    }

    fn frame(&self) -> Frame<'_> {
        Frame {
            kind: FrameKind::Station(self.station),
            bytes: &self.body,
        }
    }

    fn state(&self) -> SyncState {
        self.sync
    }

    fn resync(&mut self) {
        self.matched = 0;
        self.body.clear();
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

    fn table() -> StationTable {
        StationTable::new()
            .with_station(1, StationLayout::new(false, 0))
            .with_station(2, StationLayout::new(true, 2))
    }

    fn record(station: u8, body_len: usize, fill: u8) -> Vec<u8> {
        let mut out = vec![b'\r', b'\n', b'0'];
        out.push(station_to_char(station).unwrap_or(b'?'));
        out.push(b' ');
        out.extend(std::iter::repeat_n(fill, body_len));
        out
    }

    fn frames(f: &mut SentinelFramer, input: &[u8]) -> Vec<(u8, Vec<u8>)> {
        let mut out = Vec::new();
        let mut pos = 0;
        while let Some(frame) = feed(f, input, &mut pos) {
            if let FrameKind::Station(s) = frame.kind {
                out.push((s, frame.bytes.to_vec()));
            }
        }
        out
    }

    #[test]
    fn test_station_chars() {
        assert_eq!(station_from_char(b'7'), Some(7));
        assert_eq!(station_from_char(b'a'), Some(10));
        assert_eq!(station_from_char(b'Z'), Some(35));
        assert_eq!(station_from_char(b'-'), None);
        assert_eq!(station_to_char(11), Some(b'B'));
        assert_eq!(station_to_char(36), None);
    }

    #[test]
    fn test_body_length_follows_layout() {
        let mut f = SentinelFramer::new(table());
        let mut input = record(1, 24, 0xAA);
        input.extend(record(2, 27, 0xBB));
        let got = frames(&mut f, &input);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], (1, vec![0xAA; 24]));
        assert_eq!(got[1], (2, vec![0xBB; 27]));
        assert_eq!(f.state(), SyncState::Synchronized);
    }

    #[test]
    fn test_body_may_contain_preamble_bytes() {
        let mut f = SentinelFramer::new(table());
        let mut input = record(1, 0, 0);
        input.extend(std::iter::repeat_n(b'\r', 12));
        input.extend(std::iter::repeat_n(b'\n', 12));
        let got = frames(&mut f, &input);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].1.len(), 24);
    }

    #[test]
    fn test_unknown_station_is_skipped_and_counted() {
        let mut f = SentinelFramer::new(table());
        let mut input = record(9, 24, 0x00);
        input.extend(record(1, 24, 0x11));
        let got = frames(&mut f, &input);
        assert_eq!(got, vec![(1, vec![0x11; 24])]);
        assert_eq!(f.take_counts().skipped, 1);
    }

    #[test]
    fn test_mismatch_reevaluates_current_byte() {
        let mut f = SentinelFramer::new(table());
        let mut input = b"\r\r\n0".to_vec();
        input.extend(b"\r\n01 ");
        input.extend([0x42; 24]);
        let got = frames(&mut f, &input);
        assert_eq!(got, vec![(1, vec![0x42; 24])]);
    }

    #[test]
    fn test_gap_after_record_counts_a_resync() {
        let mut f = SentinelFramer::new(table());
        let mut input = record(1, 24, 0x01);
        input.extend(b"xyz");
        input.extend(record(1, 24, 0x02));
        let got = frames(&mut f, &input);
        assert_eq!(got.len(), 2);
        assert_eq!(f.take_counts().resyncs, 1);
    }

    #[test]
    fn test_bad_filler_is_rejected() {
        let mut f = SentinelFramer::new(table());
        let mut input = b"\r\n01#".to_vec();
        input.extend([0u8; 24]);
        assert!(frames(&mut f, &input).is_empty());
    }
}
