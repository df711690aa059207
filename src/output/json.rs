use crate::model::Advisory;
use anyhow::Result;

pub fn print_json(advisories: &[Advisory]) -> Result<()> {
    let json = serde_json::to_string_pretty(advisories)?;
    println!("{}", json);
    Ok(())
}
