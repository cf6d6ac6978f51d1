//! delete command - Delete one record
//!
//! With `--dry-run` the deletion is only logged.

use anyhow::Result;

use super::Context;
use crate::ui::output;

/// Delete the record `id` of `object_type`.
pub fn delete(ctx: &Context, object_type: &str, id: &str) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(delete_async(ctx, object_type, id))
}

async fn delete_async(ctx: &Context, object_type: &str, id: &str) -> Result<()> {
    let sf = ctx.connect()?;
    if sf.object(object_type).delete(id).await? {
        output::success(format!("Deleted {} {}", object_type, id), ctx.verbosity);
    } else {
        output::print(format!("Would delete {} {}", object_type, id), ctx.verbosity);
    }
    Ok(())
}
