//! Built-in processors.

mod session_bind;
mod vcard_temp;

use std::sync::Arc;

pub use session_bind::{SessionBind, SESSION_KEY};
pub use vcard_temp::{is_vcard_query, VCardTemp, VCARD_KEY};

use crate::processor::XmppProcessor;

/// The processors every server registers by default.
pub fn default_processors() -> Vec<Arc<dyn XmppProcessor>> {
    vec![Arc::new(SessionBind::new()), Arc::new(VCardTemp::new())]
}
