//! Reduce-side grouping of a key-ordered stream.

use super::codec::KeyValue;
use super::error::ShuffleError;
use super::framing::MessageSource;

/// All values of one key, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGroup {
    /// The shared key.
    pub key: Vec<u8>,
    /// Values in the order the source produced them.
    pub values: Vec<Vec<u8>>,
}

/// Collapses runs of equal keys from a key-ordered source into
/// [`KeyGroup`]s.
///
/// Only adjacent pairs are grouped, so the source must already be ordered
/// by key, as a merged partition reader is.
#[derive(Debug)]
pub struct KeyGroups<S> {
    source: S,
    lookahead: Option<KeyValue>,
    failed: bool,
}

impl<S: MessageSource<KeyValue>> KeyGroups<S> {
    /// Group the pairs of `source`.
    pub fn new(source: S) -> Self {
        Self {
            source,
            lookahead: None,
            failed: false,
        }
    }

    /// Return the next group, or `Ok(None)` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the source's error.
    pub fn next_group(&mut self) -> Result<Option<KeyGroup>, ShuffleError> {
        let first = match self.lookahead.take() {
            Some(kv) => kv,
            None => match self.source.recv()? {
                Some(kv) => kv,
                None => return Ok(None),
            },
        };

        let mut group = KeyGroup {
            key: first.key,
            values: vec![first.value],
        };
        while let Some(kv) = self.source.recv()? {
            if kv.key != group.key {
                self.lookahead = Some(kv);
                break;
            }
            group.values.push(kv.value);
        }
        Ok(Some(group))
    }

    /// Unwrap the source. A buffered lookahead pair is lost.
    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S: MessageSource<KeyValue>> Iterator for KeyGroups<S> {
    type Item = Result<KeyGroup, ShuffleError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.next_group().transpose();
        self.failed = matches!(item, Some(Err(_)));
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shuffle::framing::IterSource;

    #[test]
    fn test_groups_adjacent_keys() {
        let source = IterSource::new(vec![
            KeyValue::new("apple", "1"),
            KeyValue::new("apple", "3"),
            KeyValue::new("banana", "2"),
            KeyValue::new("cherry", "4"),
            KeyValue::new("cherry", "5"),
        ]);
        let groups: Vec<KeyGroup> = KeyGroups::new(source)
            .collect::<Result<_, _>>()
            .unwrap_or_default();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].key, b"apple");
        assert_eq!(groups[0].values, vec![b"1".to_vec(), b"3".to_vec()]);
        assert_eq!(groups[1].values, vec![b"2".to_vec()]);
        assert_eq!(groups[2].values, vec![b"4".to_vec(), b"5".to_vec()]);
    }

    #[test]
    fn test_empty_source() {
        let mut groups = KeyGroups::new(IterSource::new(Vec::<KeyValue>::new()));
        assert!(matches!(groups.next_group(), Ok(None)));
        assert!(groups.next().is_none());
    }

    #[test]
    fn test_error_ends_iteration() {
        struct Broken;
        impl MessageSource<KeyValue> for Broken {
            fn recv(&mut self) -> Result<Option<KeyValue>, ShuffleError> {
                Err(ShuffleError::BadLength)
            }
        }

        let mut groups = KeyGroups::new(Broken);
        assert!(matches!(groups.next(), Some(Err(ShuffleError::BadLength))));
        assert!(groups.next().is_none());
    }
}
