//! Per-slot postmark results.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use stampdesk_core::LabelSlot;

/// Outcome for one label slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SlotPostmark {
    /// The slot had no purchase request.
    #[default]
    NotRequested,
    /// Served from the postmark cache.
    Cached(Vec<u8>),
    /// Bought in this batch.
    Purchased(Vec<u8>),
}

impl SlotPostmark {
    /// PNG bytes, if the slot has a postmark.
    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::NotRequested => None,
            Self::Cached(bytes) | Self::Purchased(bytes) => Some(bytes),
        }
    }

    /// The postmark as a `data:` URI for embedding in the label layout.
    #[must_use]
    pub fn data_uri(&self) -> Option<String> {
        self.bytes()
            .map(|bytes| format!("data:image/png;base64,{}", STANDARD.encode(bytes)))
    }
}

/// Postmarks for all four slots of a sheet, indexed by slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotPostmarks([SlotPostmark; LabelSlot::COUNT]);

impl SlotPostmarks {
    /// Postmark for a slot.
    #[must_use]
    pub const fn get(&self, slot: LabelSlot) -> &SlotPostmark {
        &self.0[slot.index()]
    }

    pub(crate) fn set(&mut self, slot: LabelSlot, postmark: SlotPostmark) {
        self.0[slot.index()] = postmark;
    }

    /// All slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (LabelSlot, &SlotPostmark)> {
        LabelSlot::ALL.into_iter().zip(self.0.iter())
    }

    /// Number of slots that were bought in this batch.
    #[must_use]
    pub fn purchased_count(&self) -> usize {
        self.0
            .iter()
            .filter(|postmark| matches!(postmark, SlotPostmark::Purchased(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_not_requested() {
        let postmarks = SlotPostmarks::default();
        assert!(postmarks.iter().all(|(_, p)| *p == SlotPostmark::NotRequested));
        assert_eq!(postmarks.get(LabelSlot::BottomRight).bytes(), None);
    }

    #[test]
    fn test_set_and_get() {
        let mut postmarks = SlotPostmarks::default();
        postmarks.set(LabelSlot::TopRight, SlotPostmark::Cached(vec![1, 2]));
        postmarks.set(LabelSlot::BottomLeft, SlotPostmark::Purchased(vec![3]));

        assert_eq!(postmarks.get(LabelSlot::TopRight).bytes(), Some(&[1u8, 2][..]));
        assert_eq!(postmarks.get(LabelSlot::TopLeft), &SlotPostmark::NotRequested);
        assert_eq!(postmarks.purchased_count(), 1);
    }

    #[test]
    fn test_data_uri() {
        let postmark = SlotPostmark::Cached(b"PNG".to_vec());
        assert_eq!(postmark.data_uri().as_deref(), Some("data:image/png;base64,UE5H"));
        assert_eq!(SlotPostmark::NotRequested.data_uri(), None);
    }
}
