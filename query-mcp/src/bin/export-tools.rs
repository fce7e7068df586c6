//! Prints the tool catalogue, as served by `tools/list`, to stdout.

fn main() -> anyhow::Result<()> {
    let registry = query_mcp::tools::default_registry()?;
    println!("{}", serde_json::to_string_pretty(&registry.to_json())?);
    Ok(())
}
