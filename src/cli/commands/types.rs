//! types command - List queryable object types

use anyhow::Result;

use super::Context;
use crate::ui::output;

/// Print one object type name per line.
pub fn types(ctx: &Context) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(types_async(ctx))
}

async fn types_async(ctx: &Context) -> Result<()> {
    let sf = ctx.connect()?;
    let names = sf.object_types().await?;
    output::debug(format!("{} types", names.len()), ctx.verbosity);
    println!("{}", output::format_list(&names, ""));
    Ok(())
}
