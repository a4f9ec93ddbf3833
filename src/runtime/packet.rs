//! Packets: owned byte buffers with copy-on-write sharing and a
//! fixed-size annotation area.
//!
//! `clone` shares the underlying buffer; every mutator takes `&mut
//! self` and copies the buffer first if it is shared, so a packet
//! with visible siblings is never written through.

use std::net::Ipv4Addr;
use std::sync::Arc;

use super::Timestamp;

/// Headroom reserved in front of freshly made packets, so header
/// prepends do not reallocate.
pub const DEFAULT_HEADROOM: usize = 128;

/// Tailroom reserved behind freshly made packets.
const DEFAULT_TAILROOM: usize = 32;

/// Size of the named annotation area.
pub const ANNO_SIZE: usize = 48;

// annotation slot layout
const ANNO_DST_IP: usize = 0; // 4 bytes
const ANNO_PAINT: usize = 4; // 1 byte
const ANNO_FIX_IP_SRC: usize = 5; // 1 byte
const ANNO_PARAM_OFF: usize = 6; // 1 byte
const ANNO_FWD_RATE: usize = 8; // 4 bytes
const ANNO_REV_RATE: usize = 12; // 4 bytes
const ANNO_CYCLE: usize = 16; // 8 bytes
/// First byte of the user-defined region.
pub const ANNO_USER: usize = 24;

/// The annotation block: named slots plus header offsets and a
/// timestamp. Copied (not shared) by `clone`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Annotations {
    bytes: [u8; ANNO_SIZE],
    timestamp: Timestamp,
    /// Network header offset, absolute within the buffer.
    net_off: Option<u32>,
    /// Transport header offset, absolute within the buffer.
    trans_off: Option<u32>,
}

impl Default for Annotations {
    fn default() -> Self {
        Self {
            bytes: [0; ANNO_SIZE],
            timestamp: Timestamp::ZERO,
            net_off: None,
            trans_off: None,
        }
    }
}

/// An owned packet. Cloning shares the buffer and bumps its reference
/// count; annotations are copied.
#[derive(Clone, Debug)]
pub struct Packet {
    buf: Arc<Vec<u8>>,
    start: usize,
    end: usize,
    anno: Annotations,
}

impl Packet {
    /// A zero-filled packet of `len` bytes with default headroom and
    /// tailroom.
    pub fn make(len: usize) -> Packet {
        Packet::make_with(DEFAULT_HEADROOM, &vec![0; len], DEFAULT_TAILROOM)
    }

    /// A packet holding a copy of `data`, with the given headroom and
    /// tailroom.
    pub fn make_with(headroom: usize, data: &[u8], tailroom: usize) -> Packet {
        let mut buf = Vec::with_capacity(headroom + data.len() + tailroom);
        buf.resize(headroom, 0);
        buf.extend_from_slice(data);
        buf.resize(headroom + data.len() + tailroom, 0);
        Packet {
            buf: Arc::new(buf),
            start: headroom,
            end: headroom + data.len(),
            anno: Annotations::default(),
        }
    }

    pub fn from_data(data: &[u8]) -> Packet {
        Packet::make_with(DEFAULT_HEADROOM, data, DEFAULT_TAILROOM)
    }

    /// Drop this reference.
    pub fn kill(self) {}

    // ------------------------------------------------------------------
    // views
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// Bytes past the end of the data (within the tailroom).
    pub fn end_data(&self) -> &[u8] {
        &self.buf[self.end..]
    }

    pub fn headroom(&self) -> usize {
        self.start
    }

    pub fn tailroom(&self) -> usize {
        self.buf.len() - self.end
    }

    /// Whether the buffer is shared with clones.
    pub fn shared(&self) -> bool {
        Arc::strong_count(&self.buf) > 1
    }

    // ------------------------------------------------------------------
    // mutation
    // ------------------------------------------------------------------

    /// Ensure exclusive ownership of the buffer, copying if shared.
    pub fn uniqueify(&mut self) {
        Arc::make_mut(&mut self.buf);
    }

    /// Mutable view of the data; uniquifies first.
    pub fn data_mut(&mut self) -> &mut [u8] {
        let (start, end) = (self.start, self.end);
        &mut Arc::make_mut(&mut self.buf)[start..end]
    }

    /// Prepend `n` bytes of header space, reallocating when the
    /// headroom runs out. The new bytes are zeroed.
    pub fn push(&mut self, n: usize) {
        if self.start >= n {
            self.uniqueify();
            self.start -= n;
            let (start, _) = (self.start, self.end);
            Arc::make_mut(&mut self.buf)[start..start + n].fill(0);
        } else {
            // grow: fresh buffer with renewed headroom
            let extra = n.max(DEFAULT_HEADROOM);
            let mut buf = Vec::with_capacity(extra + self.len() + self.tailroom());
            buf.resize(extra, 0);
            buf.extend_from_slice(self.data());
            buf.resize(buf.len() + self.tailroom(), 0);
            let shift = extra as i64 - (self.start as i64 + n as i64);
            self.shift_header_offsets(shift + n as i64);
            self.end = extra + self.len();
            self.start = extra - n;
            self.buf = Arc::new(buf);
        }
    }

    /// Strip `n` header bytes by advancing the data pointer.
    pub fn pull(&mut self, n: usize) {
        self.start = (self.start + n).min(self.end);
    }

    /// Extend the data by `n` zero bytes at the tail.
    pub fn put(&mut self, n: usize) {
        if self.tailroom() >= n {
            self.uniqueify();
            let end = self.end;
            Arc::make_mut(&mut self.buf)[end..end + n].fill(0);
            self.end += n;
        } else {
            let mut buf = Vec::with_capacity(self.start + self.len() + n + DEFAULT_TAILROOM);
            buf.extend_from_slice(&self.buf[..self.end]);
            buf.resize(self.end + n + DEFAULT_TAILROOM, 0);
            self.end += n;
            self.buf = Arc::new(buf);
        }
    }

    /// Shrink the data by `n` bytes at the tail.
    pub fn take(&mut self, n: usize) {
        self.end = self.end.saturating_sub(n).max(self.start);
    }

    fn shift_header_offsets(&mut self, delta: i64) {
        for off in [&mut self.anno.net_off, &mut self.anno.trans_off] {
            if let Some(o) = off {
                *off = u32::try_from(i64::from(*o) + delta).ok();
            }
        }
    }

    // ------------------------------------------------------------------
    // header views
    // ------------------------------------------------------------------

    /// Declare the network header at `offset` bytes into the data,
    /// with a header length of `hlen`; the transport header follows.
    pub fn set_network_header(&mut self, offset: usize, hlen: usize) {
        let abs = (self.start + offset) as u32;
        self.anno.net_off = Some(abs);
        self.anno.trans_off = Some(abs + hlen as u32);
    }

    pub fn network_header(&self) -> Option<&[u8]> {
        self.anno
            .net_off
            .map(|o| &self.buf[o as usize..self.end])
    }

    pub fn transport_header(&self) -> Option<&[u8]> {
        self.anno
            .trans_off
            .map(|o| &self.buf[o as usize..self.end])
    }

    /// Offset of the network header within the current data, if any.
    pub fn network_header_offset(&self) -> Option<isize> {
        self.anno
            .net_off
            .map(|o| o as isize - self.start as isize)
    }

    // ------------------------------------------------------------------
    // annotations
    // ------------------------------------------------------------------

    pub fn copy_annotations(&mut self, from: &Packet) {
        self.anno.bytes = from.anno.bytes;
        self.anno.timestamp = from.anno.timestamp;
    }

    pub fn clear_annotations(&mut self) {
        self.anno = Annotations {
            net_off: self.anno.net_off,
            trans_off: self.anno.trans_off,
            ..Annotations::default()
        };
    }

    pub fn timestamp_anno(&self) -> Timestamp {
        self.anno.timestamp
    }

    pub fn set_timestamp_anno(&mut self, t: Timestamp) {
        self.anno.timestamp = t;
    }

    pub fn dst_ip_anno(&self) -> Ipv4Addr {
        let b = &self.anno.bytes[ANNO_DST_IP..ANNO_DST_IP + 4];
        Ipv4Addr::new(b[0], b[1], b[2], b[3])
    }

    pub fn set_dst_ip_anno(&mut self, addr: Ipv4Addr) {
        self.anno.bytes[ANNO_DST_IP..ANNO_DST_IP + 4].copy_from_slice(&addr.octets());
    }

    pub fn paint_anno(&self) -> u8 {
        self.anno.bytes[ANNO_PAINT]
    }

    pub fn set_paint_anno(&mut self, color: u8) {
        self.anno.bytes[ANNO_PAINT] = color;
    }

    pub fn fix_ip_src_anno(&self) -> bool {
        self.anno.bytes[ANNO_FIX_IP_SRC] != 0
    }

    pub fn set_fix_ip_src_anno(&mut self, fix: bool) {
        self.anno.bytes[ANNO_FIX_IP_SRC] = u8::from(fix);
    }

    pub fn param_off_anno(&self) -> u8 {
        self.anno.bytes[ANNO_PARAM_OFF]
    }

    pub fn set_param_off_anno(&mut self, off: u8) {
        self.anno.bytes[ANNO_PARAM_OFF] = off;
    }

    pub fn fwd_rate_anno(&self) -> u32 {
        u32::from_ne_bytes(self.anno.bytes[ANNO_FWD_RATE..ANNO_FWD_RATE + 4].try_into().unwrap())
    }

    pub fn set_fwd_rate_anno(&mut self, rate: u32) {
        self.anno.bytes[ANNO_FWD_RATE..ANNO_FWD_RATE + 4].copy_from_slice(&rate.to_ne_bytes());
    }

    pub fn rev_rate_anno(&self) -> u32 {
        u32::from_ne_bytes(self.anno.bytes[ANNO_REV_RATE..ANNO_REV_RATE + 4].try_into().unwrap())
    }

    pub fn set_rev_rate_anno(&mut self, rate: u32) {
        self.anno.bytes[ANNO_REV_RATE..ANNO_REV_RATE + 4].copy_from_slice(&rate.to_ne_bytes());
    }

    pub fn cycle_anno(&self) -> u64 {
        u64::from_ne_bytes(self.anno.bytes[ANNO_CYCLE..ANNO_CYCLE + 8].try_into().unwrap())
    }

    pub fn set_cycle_anno(&mut self, cycles: u64) {
        self.anno.bytes[ANNO_CYCLE..ANNO_CYCLE + 8].copy_from_slice(&cycles.to_ne_bytes());
    }

    pub fn user_anno(&self, i: usize) -> u8 {
        self.anno.bytes[ANNO_USER + i]
    }

    pub fn set_user_anno(&mut self, i: usize, v: u8) {
        self.anno.bytes[ANNO_USER + i] = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_layout() {
        let p = Packet::make(64);
        assert_eq!(p.len(), 64);
        assert_eq!(p.headroom(), DEFAULT_HEADROOM);
        assert!(p.tailroom() >= DEFAULT_TAILROOM);
        assert!(p.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_clone_shares_until_write() {
        let mut a = Packet::from_data(b"hello");
        let b = a.clone();
        assert!(a.shared());

        a.data_mut()[0] = b'H';
        assert!(!a.shared());
        assert_eq!(a.data(), b"Hello");
        assert_eq!(b.data(), b"hello");
    }

    #[test]
    fn test_push_within_headroom() {
        let mut p = Packet::from_data(b"payload");
        p.push(14);
        assert_eq!(p.len(), 7 + 14);
        assert_eq!(&p.data()[14..], b"payload");
        assert!(p.data()[..14].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_push_grows_when_headroom_exhausted() {
        let mut p = Packet::make_with(2, b"xy", 0);
        p.push(8);
        assert_eq!(p.len(), 10);
        assert_eq!(&p.data()[8..], b"xy");
        assert!(p.headroom() > 0);
    }

    #[test]
    fn test_pull_put_take() {
        let mut p = Packet::from_data(b"abcdef");
        p.pull(2);
        assert_eq!(p.data(), b"cdef");
        p.take(1);
        assert_eq!(p.data(), b"cde");
        p.put(2);
        assert_eq!(p.data(), b"cde\0\0");
        // pulling past the end clamps
        p.pull(100);
        assert!(p.is_empty());
    }

    #[test]
    fn test_push_preserves_clone(){
        let mut a = Packet::from_data(b"data");
        let b = a.clone();
        a.push(4);
        assert_eq!(b.data(), b"data");
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn test_annotations_copied_not_shared() {
        let mut a = Packet::from_data(b"x");
        a.set_paint_anno(7);
        a.set_dst_ip_anno(Ipv4Addr::new(10, 0, 0, 1));
        let mut b = a.clone();
        b.set_paint_anno(9);
        assert_eq!(a.paint_anno(), 7);
        assert_eq!(b.paint_anno(), 9);
        assert_eq!(b.dst_ip_anno(), Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn test_copy_annotations() {
        let mut a = Packet::from_data(b"x");
        a.set_fwd_rate_anno(123);
        a.set_cycle_anno(9);
        let mut b = Packet::from_data(b"y");
        b.copy_annotations(&a);
        assert_eq!(b.fwd_rate_anno(), 123);
        assert_eq!(b.cycle_anno(), 9);
    }

    #[test]
    fn test_network_header_tracks_pull() {
        let mut p = Packet::from_data(&[0u8; 34]);
        p.set_network_header(14, 20);
        assert_eq!(p.network_header().unwrap().len(), 20);
        p.pull(14);
        assert_eq!(p.network_header_offset(), Some(0));
        assert_eq!(p.transport_header().unwrap().len(), 0);
    }
}
