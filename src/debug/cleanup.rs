use std::io::ErrorKind;
use tracing::{debug, info, warn};

/// Delete the dumped cell files of an ended session.
///
/// Files that are already gone are skipped silently; any other failure is
/// logged and does not stop the remaining deletions. Returns how many files
/// were removed.
pub async fn delete_dump_files(paths: &[String]) -> usize {
    let mut deleted = 0;
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!("Deleted dump file {}", path);
                deleted += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("⚠️  Could not delete dump file {}: {}", path, e),
        }
    }

    if deleted > 0 {
        info!("🧹 Removed {} dump file(s)", deleted);
    }
    deleted
}
