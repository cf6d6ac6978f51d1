//! related command - List records related to one record
//!
//! # Example
//!
//! ```bash
//! sf related Case 1234 comments
//! sf related User jdoe cases --closed -f CaseNumber
//! ```

use anyhow::{bail, Result};

use super::{print_records, Context};
use crate::cli::args::DisplayArgs;
use crate::query::FilterOptions;
use crate::record::RecordProxy;

/// Print the records reachable from `id` through `relation`.
pub fn related(
    ctx: &Context,
    object_type: &str,
    id: &str,
    relation: &str,
    options: &FilterOptions,
    display: &DisplayArgs,
) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(related_async(ctx, object_type, id, relation, options, display))
}

async fn related_async(
    ctx: &Context,
    object_type: &str,
    id: &str,
    relation: &str,
    options: &FilterOptions,
    display: &DisplayArgs,
) -> Result<()> {
    let sf = ctx.connect()?;
    let Some(record) = sf.get(object_type, id).await? else {
        bail!("{} {} not found", object_type, id);
    };
    let records = sf.related(&record, relation, options).await?;
    if !display.all_fields && !display.fields.is_empty() {
        records.load_fields(&display.fields).await?;
    }

    let records: Vec<RecordProxy> = records.into_iter().collect();
    print_records(&records, display, ctx.verbosity).await
}
