use std::process;

use kartbok::establish_connection;

fn main() {
    env_logger::init();

    let db = match establish_connection() {
        Ok(db) => db,
        Err(err) => {
            eprintln!("Failed to connect: {}", err);
            process::exit(1);
        }
    };
    if let Err(err) = db.create_db() {
        eprintln!("Failed to create DB: {}", err);
        process::exit(1);
    }
}
