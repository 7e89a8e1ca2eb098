use crate::db::{find_user, list_accounts, transaction_count, Ledger};
use crate::error::Result;
use crate::session_store::SessionStore;
use crate::settings::load_settings;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = settings.data_path();
    let ledger = Ledger::in_data_dir(&data_dir);

    println!("User:       {}", settings.user_name);
    println!("Data dir:   {}", data_dir.display());
    println!("Ledger:     {}", ledger.path().display());

    if ledger.exists() {
        let conn = ledger.connect()?;
        let (accounts, transactions) = match find_user(&conn, &settings.user_name)? {
            Some(user_id) => (
                list_accounts(&conn, user_id)?.len(),
                transaction_count(&conn, user_id)?,
            ),
            None => (0, 0),
        };
        let store = SessionStore::new(&data_dir, settings.session_ttl());
        store.sweep()?;

        println!();
        println!("Accounts:         {accounts}");
        println!("Transactions:     {transactions}");
        println!("Pending reviews:  {}", store.count());
    } else {
        println!();
        println!("Ledger not found. Run `tally init` to set up.");
    }

    Ok(())
}
