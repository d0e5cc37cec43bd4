use super::{Frame, FrameKind, SyncCounts, SyncState};

/// Treats every transport read as one record.
///
/// Datagram transports preserve boundaries, so there is nothing to lose
/// sync on; the framer is always synchronized.
#[derive(Debug, Default, Clone, Copy)]
pub struct DatagramFramer;

impl DatagramFramer {
    pub fn new() -> Self {
        Self
    }

    /// The rest of `input` as a single frame; empty reads yield nothing.
    pub fn take_frame<'a>(&self, input: &'a [u8], pos: &mut usize) -> Option<Frame<'a>> {
        let rest = input.get(*pos..).filter(|r| !r.is_empty())?;
        *pos = input.len();
        Some(Frame {
            kind: FrameKind::Datagram,
            bytes: rest,
        })
    }

    pub fn state(&self) -> SyncState {
        SyncState::Synchronized
    }

    pub fn resync(&mut self) {}

    pub fn take_counts(&mut self) -> SyncCounts {
        SyncCounts::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_frame_per_read() {
        let f = DatagramFramer::new();
        let input = [0x30, 0x00, 0x08];
        let mut pos = 0;
        let frame = f.take_frame(&input, &mut pos);
        assert_eq!(frame.map(|fr| fr.bytes), Some(&input[..]));
        assert!(f.take_frame(&input, &mut pos).is_none());
        assert!(f.take_frame(&[], &mut 0).is_none());
    }
}
