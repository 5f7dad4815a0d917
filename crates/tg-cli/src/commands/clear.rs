//! Clear command: delete recorded usage.

use std::io::Write;

use anyhow::Result;
use tg_db::Store;

pub fn run<W: Write>(writer: &mut W, store: &mut Store) -> Result<()> {
    if store.clear_usage()? {
        tracing::info!("usage data cleared");
        writeln!(writer, "Cleared recorded usage.")?;
    } else {
        writeln!(writer, "No usage recorded.")?;
    }
    Ok(())
}
