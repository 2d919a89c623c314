//! Dump any paginated listing as JSON lines

use crate::error::Result;
use crate::pagination::{FetchRequest, PaginatedFetcher};
use futures::TryStreamExt;
use std::io::Write;
use tracing::info;

/// Write every record of `request` to `out`, one JSON document per line.
///
/// Returns the number of records written. Pages are written as they arrive,
/// so a failure part-way leaves the earlier pages in `out`.
pub async fn dump_records<W: Write>(
    fetcher: &PaginatedFetcher,
    request: FetchRequest,
    out: &mut W,
) -> Result<usize> {
    let url = request.url.clone();
    let mut pages = Box::pin(fetcher.fetch_all(request));
    let mut written = 0;

    while let Some(page) = pages.try_next().await? {
        for record in &page.records {
            serde_json::to_writer(&mut *out, record)?;
            out.write_all(b"\n")?;
        }
        written += page.len();
    }
    out.flush()?;

    info!("Wrote {written} records from {url}");
    Ok(written)
}
