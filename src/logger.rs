use log::LevelFilter;
use std::str::FromStr;

use crate::AppError;

pub fn init(level: &str) -> Result<(), AppError> {
    let mut logger = env_logger::Builder::new();
    logger.format_timestamp_millis();
    logger.filter(None, LevelFilter::from_str(level)?);
    logger.try_init()?;

    Ok(())
}
