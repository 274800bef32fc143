use std::path::PathBuf;

use ledger_triage::db::{get_connection, init_db};
use ledger_triage::error::Result;
use ledger_triage::settings::{db_path, expand_home, load_settings, save_settings, shellexpand_path};

pub fn run(data_dir: Option<String>, default_company: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        let dir = expand_home(&dir);
        std::fs::create_dir_all(&dir)?;
        settings.data_dir = shellexpand_path(&dir);
    }
    if default_company.is_some() {
        settings.default_company = default_company;
    }

    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&resolved)?;
    save_settings(&settings)?;

    let conn = get_connection(&db_path(&settings))?;
    init_db(&conn)?;

    println!("Initialized ledger-triage at {}", resolved.display());
    Ok(())
}
