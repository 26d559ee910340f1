use dockyard::MigrationSet;

pub fn run_migrations_ls() -> anyhow::Result<()> {
    let scripts = MigrationSet::embedded()?;
    for migration in scripts.iter() {
        println!("{}: {}", migration.version, migration.name);
    }
    Ok(())
}
