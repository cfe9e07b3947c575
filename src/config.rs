use dotenv::dotenv;
use std::env;

use crate::error::{Error, Result};

const DEFAULT_POOL_SIZE: u32 = 8;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub pool_size: u32,
}

impl Config {
    /// Reads `DATABASE_URL` and `DATABASE_POOL_SIZE`, picking up a `.env` file if present.
    pub fn from_env() -> Result<Config> {
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").map_err(|_| Error::Config("DATABASE_URL is not set".into()))?;

        let pool_size = match env::var("DATABASE_POOL_SIZE") {
            Ok(val) => parse_pool_size(&val)?,
            Err(_) => DEFAULT_POOL_SIZE,
        };

        Ok(Config {
            database_url,
            pool_size,
        })
    }
}

fn parse_pool_size(val: &str) -> Result<u32> {
    match val.trim().parse::<u32>() {
        Ok(0) | Err(_) => Err(Error::Config(format!(
            "DATABASE_POOL_SIZE must be a positive integer, got {:?}",
            val
        ))),
        Ok(size) => Ok(size),
    }
}
