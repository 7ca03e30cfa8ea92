use crate::models::Link;

/// Bots get the cloaking URL when the link has cloaking switched on and a URL
/// configured; everyone else goes to the real destination.
pub fn resolve_target(link: &Link, is_bot: bool) -> &str {
    match link.effective_cloaking_url() {
        Some(cloaking_url) if is_bot => cloaking_url,
        _ => &link.destination_url,
    }
}
