//! Package version ordering compatible with pacman's `vercmp`.
//!
//! Versions have the form `[epoch:]version[-release]`. Epochs compare
//! numerically, the release is only compared when both sides carry one.

use std::cmp::Ordering;

/// Version comparator - pure functions over version strings.
pub struct VersionComparator;

impl VersionComparator {
    /// Compare two full version strings.
    pub fn compare(a: &str, b: &str) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let (epoch_a, version_a, release_a) = Self::split(a);
        let (epoch_b, version_b, release_b) = Self::split(b);

        Self::segments(epoch_a, epoch_b)
            .then_with(|| Self::segments(version_a, version_b))
            .then_with(|| match (release_a, release_b) {
                (Some(ra), Some(rb)) => Self::segments(ra, rb),
                _ => Ordering::Equal,
            })
    }

    /// Sort versions newest first.
    pub fn sort_descending(versions: &mut [String]) {
        versions.sort_by(|a, b| Self::compare(b, a));
    }

    /// Split `epoch:version-release`, defaulting the epoch to `0`.
    fn split(full: &str) -> (&str, &str, Option<&str>) {
        let (epoch, rest) = match full.find(':') {
            Some(index) if full[..index].chars().all(|c| c.is_ascii_digit()) => {
                (&full[..index], &full[index + 1..])
            }
            _ => ("0", full),
        };
        match rest.rfind('-') {
            Some(index) => (epoch, &rest[..index], Some(&rest[index + 1..])),
            None => (epoch, rest, None),
        }
    }

    /// Segment-wise comparison of one version component.
    fn segments(a: &str, b: &str) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let a = a.as_bytes();
        let b = b.as_bytes();
        let (mut i, mut j) = (0, 0);

        while i < a.len() && j < b.len() {
            let sep_start_a = i;
            while i < a.len() && !a[i].is_ascii_alphanumeric() {
                i += 1;
            }
            let sep_start_b = j;
            while j < b.len() && !b[j].is_ascii_alphanumeric() {
                j += 1;
            }
            if i >= a.len() || j >= b.len() {
                break;
            }
            let sep_a = i - sep_start_a;
            let sep_b = j - sep_start_b;
            if sep_a != sep_b {
                return sep_a.cmp(&sep_b);
            }

            let numeric = a[i].is_ascii_digit();
            let seg_a = Self::take_segment(a, &mut i, numeric);
            let seg_b = Self::take_segment(b, &mut j, numeric);

            // Numeric segments are newer than alpha ones.
            if seg_b.is_empty() {
                return if numeric {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
            }

            let ordering = if numeric {
                let trimmed_a = Self::trim_zeros(seg_a);
                let trimmed_b = Self::trim_zeros(seg_b);
                trimmed_a
                    .len()
                    .cmp(&trimmed_b.len())
                    .then_with(|| trimmed_a.cmp(trimmed_b))
            } else {
                seg_a.cmp(seg_b)
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        let a_done = i >= a.len();
        let b_done = j >= b.len();
        if a_done && b_done {
            Ordering::Equal
        } else if (a_done && !b[j].is_ascii_alphabetic())
            || (!a_done && a[i].is_ascii_alphabetic())
        {
            // A remaining alpha segment never beats an empty one.
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }

    fn take_segment<'a>(bytes: &'a [u8], index: &mut usize, numeric: bool) -> &'a [u8] {
        let start = *index;
        while *index < bytes.len()
            && if numeric {
                bytes[*index].is_ascii_digit()
            } else {
                bytes[*index].is_ascii_alphabetic()
            }
        {
            *index += 1;
        }
        &bytes[start..*index]
    }

    fn trim_zeros(segment: &[u8]) -> &[u8] {
        let zeros = segment.iter().take_while(|b| **b == b'0').count();
        &segment[zeros..]
    }
}
