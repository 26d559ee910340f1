use dockyard::orchestrator::reset_data;
use dockyard::Config;

pub fn run_reset(config: &Config) -> anyhow::Result<()> {
    let removed = reset_data(config)?;
    if removed.is_empty() {
        println!("Nothing to reset under {}", config.data_dir().display());
    } else {
        for path in &removed {
            println!("Removed {}", path.display());
        }
        println!("Datastore reset; the next `dockyard serve` starts from an empty cluster");
    }
    Ok(())
}
