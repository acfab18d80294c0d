pub mod index;
pub mod inspect;
pub mod invoice;
pub mod migrate;

use std::path::PathBuf;

use anyhow::Result;

use marketfs::{
    config::{load_or_default, Config},
    store::StorageClient,
};

pub(crate) fn open_storage(config_path: Option<PathBuf>) -> Result<(Config, StorageClient)> {
    let (config, _path) = load_or_default(config_path)?;
    let storage = StorageClient::open(&config)?;
    Ok((config, storage))
}
