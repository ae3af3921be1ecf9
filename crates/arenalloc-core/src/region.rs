//! Backing memory regions.
//!
//! The engines never acquire memory. A [`Region`] is handed to `create`,
//! owned by the allocator for its whole lifetime, and given back to its
//! provider exactly once through [`Region::release`] when the allocator is
//! destroyed.

use crate::error::AllocError;

/// A fixed-size byte buffer an allocator manages exclusively.
pub trait Region {
    /// The whole region, header included.
    fn bytes(&self) -> &[u8];

    /// Mutable view of the whole region.
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Total size in bytes, as handed to `create`.
    fn len(&self) -> usize {
        self.bytes().len()
    }

    /// Returns true for a zero-length region.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gives the region back to whoever provided it.
    ///
    /// Called once, from `destroy`.
    fn release(self) -> Result<(), AllocError>
    where
        Self: Sized;
}

impl Region for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }

    fn release(self) -> Result<(), AllocError> {
        drop(self);
        Ok(())
    }
}

impl Region for Box<[u8]> {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }

    fn release(self) -> Result<(), AllocError> {
        drop(self);
        Ok(())
    }
}

/// A borrowed buffer; releasing it just ends the borrow.
impl Region for &mut [u8] {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }

    fn release(self) -> Result<(), AllocError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_region_reports_length() {
        let region = vec![0u8; 128];
        assert_eq!(Region::len(&region), 128);
        assert!(!Region::is_empty(&region));
        assert!(region.release().is_ok());
    }

    #[test]
    fn borrowed_region_release_is_noop() {
        let mut backing = [7u8; 16];
        {
            let mut region: &mut [u8] = &mut backing;
            region.bytes_mut()[0] = 1;
            assert!(region.release().is_ok());
        }
        assert_eq!(backing[0], 1);
        assert_eq!(backing[1], 7);
    }
}
