use crate::db::{ensure_user, init_db, Ledger};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, settings_file_exists, shellexpand_path};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    let existed = settings_file_exists();
    save_settings(&settings)?;

    let resolved = settings.data_path();
    std::fs::create_dir_all(resolved.join("sessions"))?;

    let ledger = Ledger::in_data_dir(&resolved);
    let conn = ledger.connect()?;
    init_db(&conn)?;
    ensure_user(&conn, &settings.user_name)?;

    if existed {
        println!("Updated tally at {}", resolved.display());
    } else {
        println!("Initialized tally at {}", resolved.display());
    }
    Ok(())
}
