#![allow(dead_code)]

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pudl_etl::config::Settings;
use pudl_etl::extract::FsPartitionSource;
use pudl_etl::tables::StagingTable;
use pudl_etl::transform::crosswalk::MAPPINGS_DIR;

/// Settings rooted in a scratch directory: partitions under `data/`, test
/// databases under `test/`.
pub fn settings(root: &Path) -> Settings {
    Settings {
        data_root: root.join("data"),
        test_dir: root.join("test"),
        ..Settings::default()
    }
}

/// Write a partition where the filesystem partition source looks for it.
pub fn write_partition(settings: &Settings, table: StagingTable, year: u16, contents: &[u8]) -> Result<()> {
    let path = FsPartitionSource::new(&settings.data_root).path_for(table, year);
    let dir = path.parent().context("partition path has no parent")?;
    fs::create_dir_all(dir)?;
    fs::write(&path, contents)?;
    Ok(())
}

pub fn write_mapping(settings: &Settings, file: &str, contents: &str) -> Result<()> {
    let dir = settings.data_root.join(MAPPINGS_DIR);
    fs::create_dir_all(&dir)?;
    fs::write(dir.join(file), contents)?;
    Ok(())
}

pub const FUEL_2009: &str = "respondent_id,spplmnt_num,row_number,plant_name,fuel,fuel_unit,fuel_quantity\n\
1,0,1,Sherco,coal,tons,1200\n\
1,0,2,Sherco,gas,mcf,300\n\
2,0,1,Black Dog,gas,mcf,55\n";

pub const FUEL_2010: &str = "respondent_id,spplmnt_num,row_number,plant_name,fuel,fuel_unit,fuel_quantity\n\
1,0,1,Sherco,coal,tons,1150\n\
2,0,1,Black Dog,gas,mcf,61\n";

pub const RESPONDENTS: &str = "respondent_id,respondent_name,respondent_state\n\
1,Northern States Power Co,MN\n\
2,Otter Tail Power Co,MN\n";

pub fn write_fuel_partitions(settings: &Settings) -> Result<()> {
    write_partition(settings, StagingTable::F1Fuel, 2009, FUEL_2009.as_bytes())?;
    write_partition(settings, StagingTable::F1Fuel, 2010, FUEL_2010.as_bytes())?;
    write_partition(settings, StagingTable::F1RespondentId, 2009, RESPONDENTS.as_bytes())?;
    write_partition(settings, StagingTable::F1RespondentId, 2010, RESPONDENTS.as_bytes())?;
    Ok(())
}
