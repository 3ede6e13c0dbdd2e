use anyhow::Result;
use std::process;

use crate::args::BaseArgs;

pub fn run(base: BaseArgs, key: &str, global: bool, local: bool) -> Result<()> {
    let cfg = if global {
        super::load_global()?
    } else if local {
        super::local_path()
            .map(|p| super::load_file(&p))
            .unwrap_or_default()
    } else {
        super::load()?
    };

    match cfg.get_field(key) {
        Some(value) => {
            if base.json {
                println!("{}", serde_json::to_string(value)?);
            } else {
                println!("{value}");
            }
            Ok(())
        }
        // unset keys exit non-zero so scripts can test for them
        None => process::exit(1),
    }
}
