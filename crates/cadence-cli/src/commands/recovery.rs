use cadence_core::recovery::RecoveryManager;
use cadence_core::storage::Database;
use cadence_core::Config;

fn manager() -> Result<RecoveryManager<Database>, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    Ok(RecoveryManager::new(Database::open()?, &config.recovery))
}

pub fn status() -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = manager()?.peek()?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

pub fn discard() -> Result<(), Box<dyn std::error::Error>> {
    manager()?.discard()?;
    println!("ok");
    Ok(())
}
