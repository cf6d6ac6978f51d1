//! query command - List records matching filter flags
//!
//! # Example
//!
//! ```bash
//! sf query Case --mine --contains printer -f CaseNumber -f Subject
//! sf query TimeCard__c --after 2024-01-01 --before 2024-02-01 --min 30
//! ```

use anyhow::Result;

use super::{print_records, Context};
use crate::cli::args::DisplayArgs;
use crate::query::FilterOptions;
use crate::record::RecordProxy;
use crate::ui::output;

/// Print every record of `object_type` matching `options`.
pub fn query(
    ctx: &Context,
    object_type: &str,
    options: &FilterOptions,
    display: &DisplayArgs,
) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(query_async(ctx, object_type, options, display))
}

async fn query_async(
    ctx: &Context,
    object_type: &str,
    options: &FilterOptions,
    display: &DisplayArgs,
) -> Result<()> {
    let sf = ctx.connect()?;
    let records = sf.object(object_type).find_options(options).await?;
    if !display.all_fields && !display.fields.is_empty() {
        records.load_fields(&display.fields).await?;
    }
    output::debug(format!("{} records", records.len()), ctx.verbosity);

    let records: Vec<RecordProxy> = records.into_iter().collect();
    print_records(&records, display, ctx.verbosity).await
}
