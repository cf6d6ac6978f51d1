//! get command - Show one record
//!
//! # Example
//!
//! ```bash
//! # Case by number, default fields
//! sf get Case 1234
//!
//! # Every field, labelled
//! sf get Case 500000000000001AAA --all-fields
//! ```

use anyhow::{bail, Result};

use super::{print_records, Context};
use crate::cli::args::DisplayArgs;

/// Print the record `id` of `object_type`.
pub fn get(ctx: &Context, object_type: &str, id: &str, display: &DisplayArgs) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(get_async(ctx, object_type, id, display))
}

async fn get_async(
    ctx: &Context,
    object_type: &str,
    id: &str,
    display: &DisplayArgs,
) -> Result<()> {
    let sf = ctx.connect()?;
    let Some(record) = sf.get(object_type, id).await? else {
        bail!("{} {} not found", object_type, id);
    };
    print_records(&[record], display, ctx.verbosity).await
}
