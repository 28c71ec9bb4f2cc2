//! Ordering of open and close markers.

use ahash::AHashMap;

use crate::error::{Result, TagstoreError};
use crate::store::StoredTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Open,
    Close,
    SelfClosing,
}

/// One piece of markup anchored at a text position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker<'a> {
    /// Char offset into the document text.
    pub position: usize,
    pub kind: MarkerKind,
    pub tag: &'a StoredTag,
}

impl Marker<'_> {
    fn open(tag: &StoredTag, self_closing: bool) -> Marker<'_> {
        Marker {
            position: tag.start_offset as usize,
            kind: if self_closing {
                MarkerKind::SelfClosing
            } else {
                MarkerKind::Open
            },
            tag,
        }
    }

    fn close(tag: &StoredTag) -> Marker<'_> {
        Marker {
            position: tag.end_offset as usize,
            kind: MarkerKind::Close,
            tag,
        }
    }
}

/// Parent links used to answer ancestry questions.
struct Ancestry {
    parents: AHashMap<i64, Option<i64>>,
}

impl Ancestry {
    fn new(tags: &[StoredTag]) -> Self {
        Ancestry {
            parents: tags.iter().map(|tag| (tag.id, tag.parent)).collect(),
        }
    }

    /// Whether `ancestor` is a strict ancestor of `tag`.
    fn is_ancestor(&self, ancestor: i64, tag: i64) -> bool {
        let mut current = self.parents.get(&tag).copied().flatten();
        // Bounded walk, parent links may be corrupt.
        for _ in 0..=self.parents.len() {
            match current {
                Some(id) if id == ancestor => return true,
                Some(id) => current = self.parents.get(&id).copied().flatten(),
                None => return false,
            }
        }
        false
    }
}

/// Order the markers of `tags`, given in store order (start offset
/// descending, then id descending).
///
/// Tags are consumed in batches sharing a start offset, leftmost batch
/// first. Within a batch a tag is placed once its parent is no longer in
/// the batch. Before an open marker, pending closes that lie before it are
/// emitted; a close at the same offset is kept open when it belongs to an
/// ancestor. A zero-width tag with no child left in its batch becomes a
/// single self-closing marker.
pub fn arrange(tags: &[StoredTag]) -> Result<Vec<Marker<'_>>> {
    for tag in tags {
        if tag.start_offset < 0 || tag.start_offset > tag.end_offset {
            return Err(TagstoreError::InvalidOffsets {
                tag_id: tag.id,
                start: tag.start_offset,
                end: tag.end_offset,
            });
        }
    }

    let ancestry = Ancestry::new(tags);
    let mut remaining: Vec<&StoredTag> = tags.iter().collect();
    let mut markers = Vec::with_capacity(tags.len() * 2);
    let mut pending: Vec<&StoredTag> = Vec::new();

    while let Some(last) = remaining.last() {
        let position = last.start_offset;
        let split = remaining
            .iter()
            .rposition(|tag| tag.start_offset != position)
            .map_or(0, |index| index + 1);
        let mut batch: Vec<&StoredTag> = remaining.drain(split..).rev().collect();

        while !batch.is_empty() {
            let index = batch
                .iter()
                .position(|tag| match tag.parent {
                    Some(parent) => !batch.iter().any(|other| other.id == parent),
                    None => true,
                })
                .ok_or_else(|| {
                    TagstoreError::structure(format!("cyclic parent links at offset {position}"))
                })?;
            let tag = batch.remove(index);

            while let Some(&open) = pending.last() {
                let closes_first = open.end_offset < tag.start_offset
                    || (open.end_offset == tag.start_offset
                        && !ancestry.is_ancestor(open.id, tag.id));
                if !closes_first {
                    break;
                }
                markers.push(Marker::close(open));
                pending.pop();
            }

            let self_closing = tag.start_offset == tag.end_offset
                && !batch.iter().any(|other| other.parent == Some(tag.id));
            markers.push(Marker::open(tag, self_closing));
            if !self_closing {
                pending.push(tag);
            }
        }
    }

    while let Some(open) = pending.pop() {
        markers.push(Marker::close(open));
    }

    Ok(markers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(id: i64, name: &str, parent: Option<i64>, start: i64, end: i64) -> StoredTag {
        StoredTag {
            id,
            name: name.to_string(),
            parent,
            start_offset: start,
            end_offset: end,
            attributes: Vec::new(),
        }
    }

    /// Sort like the store does.
    fn store_order(mut tags: Vec<StoredTag>) -> Vec<StoredTag> {
        tags.sort_by(|a, b| {
            b.start_offset
                .cmp(&a.start_offset)
                .then(b.id.cmp(&a.id))
        });
        tags
    }

    fn sequence(markers: &[Marker<'_>]) -> Vec<String> {
        markers
            .iter()
            .map(|m| match m.kind {
                MarkerKind::Open => format!("<{}>@{}", m.tag.name, m.position),
                MarkerKind::Close => format!("</{}>@{}", m.tag.name, m.position),
                MarkerKind::SelfClosing => format!("<{}/>@{}", m.tag.name, m.position),
            })
            .collect()
    }

    #[test]
    fn test_siblings_and_nesting() {
        // <doc><p>ab </p><p>cd </p></doc>
        let tags = store_order(vec![
            tag(1, "doc", None, 0, 6),
            tag(2, "p", Some(1), 0, 3),
            tag(3, "p", Some(1), 3, 6),
        ]);
        let markers = arrange(&tags).unwrap();
        assert_eq!(
            sequence(&markers),
            vec!["<doc>@0", "<p>@0", "</p>@3", "<p>@3", "</p>@6", "</doc>@6"]
        );
    }

    #[test]
    fn test_zero_width_tag_self_closes() {
        let tags = store_order(vec![tag(1, "doc", None, 0, 4), tag(2, "br", Some(1), 4, 4)]);
        let markers = arrange(&tags).unwrap();
        assert_eq!(sequence(&markers), vec!["<doc>@0", "<br/>@4", "</doc>@4"]);
    }

    #[test]
    fn test_zero_width_parent_wraps_zero_width_child() {
        // <doc>x <a><b/></a></doc>
        let tags = store_order(vec![
            tag(1, "doc", None, 0, 2),
            tag(2, "a", Some(1), 2, 2),
            tag(3, "b", Some(2), 2, 2),
        ]);
        let markers = arrange(&tags).unwrap();
        assert_eq!(
            sequence(&markers),
            vec!["<doc>@0", "<a>@2", "<b/>@2", "</a>@2", "</doc>@2"]
        );
    }

    #[test]
    fn test_same_offset_parent_precedes_child() {
        // The child has the lower id here, so batch order alone would be wrong.
        let tags = store_order(vec![tag(5, "outer", None, 0, 3), tag(4, "inner", Some(5), 0, 3)]);
        let markers = arrange(&tags).unwrap();
        assert_eq!(
            sequence(&markers),
            vec!["<outer>@0", "<inner>@0", "</inner>@3", "</outer>@3"]
        );
    }

    #[test]
    fn test_empty_sibling_after_closed_tag() {
        // <doc><p>ab </p><hr/></doc>
        let tags = store_order(vec![
            tag(1, "doc", None, 0, 3),
            tag(2, "p", Some(1), 0, 3),
            tag(3, "hr", Some(1), 3, 3),
        ]);
        let markers = arrange(&tags).unwrap();
        assert_eq!(
            sequence(&markers),
            vec!["<doc>@0", "<p>@0", "</p>@3", "<hr/>@3", "</doc>@3"]
        );
    }

    #[test]
    fn test_inverted_offsets_are_rejected() {
        let tags = vec![tag(9, "bad", None, 5, 2)];
        match arrange(&tags) {
            Err(TagstoreError::InvalidOffsets { tag_id, start, end }) => {
                assert_eq!((tag_id, start, end), (9, 5, 2));
            }
            other => panic!("expected InvalidOffsets, got {other:?}"),
        }
    }
}
