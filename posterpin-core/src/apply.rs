use posterpin_model::PosterUrl;
use tracing::trace;

use crate::page::{HostPage, NodeId};

/// Overwrite `img`'s source with `url` and drop its responsive and lazy-load
/// sources, unless it already shows `url`. Returns whether anything changed.
///
/// Every trigger (reconciliation tick, sweep tick, insertion notification)
/// goes through here, so overlapping triggers on one element are harmless.
pub fn force_poster(page: &dyn HostPage, img: NodeId, url: &PosterUrl) -> bool {
    if page.attribute(img, "src").as_deref() == Some(url.as_str()) {
        return false;
    }

    page.set_attribute(img, "src", url.as_str());
    page.remove_attribute(img, "srcset");
    page.remove_attribute(img, "data-src");
    trace!(%img, url = %url, "poster forced");
    true
}
