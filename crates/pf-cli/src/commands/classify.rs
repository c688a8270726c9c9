//! `pspfeed classify <url>`

use pf_core::source::ConnectionDescriptor;
use std::io::Write;

/// Print the scheme tag and kind of `url`. Unrecognized urls are an error.
pub fn run(url: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let descriptor = ConnectionDescriptor::parse(url)?;
    writeln!(out, "{}\t{}", descriptor.kind.scheme_tag(), descriptor.kind)?;
    Ok(())
}
