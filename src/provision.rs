//! Check-then-create directory provisioning ahead of file writes.

use crate::error::TransferResult;
use crate::transport::RemoteSession;

/// Directory segments of the base folder. `media/bot` is two segments;
/// blank and repeated separators are dropped.
fn base_segments<'a>(base_folder: Option<&'a str>) -> impl Iterator<Item = &'a str> + 'a {
    base_folder
        .into_iter()
        .flat_map(|base| base.split('/'))
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
}

/// Directory segments for a user folder, optionally under a base folder.
/// A blank base folder is skipped.
pub fn segments<'a>(base_folder: Option<&'a str>, user_folder: &'a str) -> Vec<&'a str> {
    base_segments(base_folder)
        .chain(std::iter::once(user_folder))
        .collect()
}

/// Remote path of a user folder, for messages
pub fn display_path(base_folder: Option<&str>, user_folder: &str) -> String {
    segments(base_folder, user_folder).join("/")
}

/// Make sure `[base_folder/]user_folder` exists and move the session into
/// it. Segments created before a failure are left in place.
pub async fn ensure_path(
    session: &mut dyn RemoteSession,
    base_folder: Option<&str>,
    user_folder: &str,
) -> TransferResult<()> {
    session
        .ensure_directory(&segments(base_folder, user_folder))
        .await
}

/// Move the session into the base folder, creating it if needed
pub async fn ensure_base(
    session: &mut dyn RemoteSession,
    base_folder: Option<&str>,
) -> TransferResult<()> {
    let segments: Vec<&str> = base_segments(base_folder).collect();
    session.ensure_directory(&segments).await
}
