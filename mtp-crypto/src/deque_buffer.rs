//! Byte buffer with cheap prepend, used to build `key_id ‖ msg_key ‖ ciphertext`
//! around a plaintext without copying it.

use std::ops::{Index, IndexMut};
use std::slice::SliceIndex;

/// Growable byte buffer with reserved headroom at the front.
#[derive(Clone, Debug)]
pub struct DequeBuffer {
    buf: Vec<u8>,
    head: usize,
    default_head: usize,
}

impl DequeBuffer {
    /// Reserve `back` bytes for the body and `front` bytes of headroom.
    pub fn with_capacity(back: usize, front: usize) -> Self {
        let mut buf = Vec::with_capacity(front + back);
        buf.resize(front, 0);
        Self { buf, head: front, default_head: front }
    }

    /// Start from `body`, keeping `front` bytes of headroom.
    pub fn from_body(body: &[u8], front: usize) -> Self {
        let mut this = Self::with_capacity(body.len(), front);
        this.buf.extend_from_slice(body);
        this
    }

    /// Empty the buffer, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.truncate(self.default_head);
        self.buf[..self.default_head].fill(0);
        self.head = self.default_head;
    }

    /// Prepend `slice`.
    pub fn extend_front(&mut self, slice: &[u8]) {
        if self.head >= slice.len() {
            self.head -= slice.len();
        } else {
            let shift = slice.len() - self.head;
            self.buf.extend(std::iter::repeat_n(0, shift));
            self.buf.rotate_right(shift);
            self.head = 0;
        }
        self.buf[self.head..self.head + slice.len()].copy_from_slice(slice);
    }

    pub fn len(&self) -> usize { self.buf.len() - self.head }

    pub fn is_empty(&self) -> bool { self.head == self.buf.len() }

    /// Take the contents as a `Vec`, dropping the headroom.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.buf.drain(..self.head);
        self.buf
    }
}

impl AsRef<[u8]> for DequeBuffer {
    fn as_ref(&self) -> &[u8] { &self.buf[self.head..] }
}
impl AsMut<[u8]> for DequeBuffer {
    fn as_mut(&mut self) -> &mut [u8] { &mut self.buf[self.head..] }
}
impl<I: SliceIndex<[u8]>> Index<I> for DequeBuffer {
    type Output = I::Output;
    fn index(&self, i: I) -> &Self::Output { self.as_ref().index(i) }
}
impl<I: SliceIndex<[u8]>> IndexMut<I> for DequeBuffer {
    fn index_mut(&mut self, i: I) -> &mut Self::Output { self.as_mut().index_mut(i) }
}
impl Extend<u8> for DequeBuffer {
    fn extend<T: IntoIterator<Item = u8>>(&mut self, iter: T) { self.buf.extend(iter); }
}
impl<'a> Extend<&'a u8> for DequeBuffer {
    fn extend<T: IntoIterator<Item = &'a u8>>(&mut self, iter: T) { self.buf.extend(iter); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepend_within_and_beyond_headroom() {
        let mut b = DequeBuffer::from_body(&[5, 6], 2);
        b.extend_front(&[3, 4]);
        assert_eq!(b.as_ref(), &[3, 4, 5, 6]);
        b.extend_front(&[1, 2]);
        assert_eq!(b.as_ref(), &[1, 2, 3, 4, 5, 6]);
        b.extend([7u8]);
        assert_eq!(b.len(), 7);
        assert_eq!(b.into_vec(), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn clear_restores_headroom() {
        let mut b = DequeBuffer::with_capacity(4, 8);
        b.extend([1u8, 2]);
        b.extend_front(&[9; 8]);
        b.clear();
        assert!(b.is_empty());
        b.extend_front(&[1; 8]);
        assert_eq!(b.len(), 8);
    }
}
