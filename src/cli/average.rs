use std::path::Path;

use anyhow::{bail, Context, Result};

use powercap::stats;

// ONE AVERAGED Net_* LINE OVER EVERY RUN IN THE INPUT FILE
pub fn run_average(input: &Path, output: &Path) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let Some(avg) = stats::average(&text) else {
        bail!("no Net_* lines in {}", input.display());
    };
    let line = avg.render();
    std::fs::write(output, format!("{}\n", line))
        .with_context(|| format!("writing {}", output.display()))?;
    println!("{}", line);
    Ok(())
}
