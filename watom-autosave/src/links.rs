//! Navigation suppression inside the preview document

use std::sync::Arc;

use crate::dom::{ClickEvent, ClickListener, PreviewSurface};

/// Click interceptor that cancels navigation
pub fn navigation_blocker() -> ClickListener {
    Arc::new(|event: &mut ClickEvent| event.prevent_default())
}

/// Attach a [`navigation_blocker`] to every anchor of the loaded preview document
///
/// Each reload replaces the document and drops its listeners, so this has to run
/// after every load. Running it twice on the same document attaches twice.
pub fn disable_links(preview: &dyn PreviewSurface) -> usize {
    let anchors = preview.anchors();
    for anchor in &anchors {
        anchor.add_click_listener(navigation_blocker());
    }
    anchors.len()
}
