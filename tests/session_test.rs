mod common;

use std::sync::Arc;

use anyhow::Result;
use pudl_etl::config::Settings;
use pudl_etl::constants::Source;
use pudl_etl::db::{ConnectionProvider, DatabaseKind, DbTarget};
use pudl_etl::extract::FsPartitionSource;
use pudl_etl::lifecycle::{DbState, IntegratedRequest, LifecycleManager, StagingRequest};
use pudl_etl::schema::SchemaRegistry;
use pudl_etl::session::{Session, SessionPlan};
use pudl_etl::tables::{IntegratedTable, StagingTable, TableSelection};
use pudl_etl::transform::{ExclusionReason, LoadYears};
use pudl_etl::years::YearSpan;
use tempfile::tempdir;

fn write_2015_partitions(settings: &Settings) -> Result<()> {
    common::write_partition(
        settings,
        StagingTable::F1RespondentId,
        2015,
        b"respondent_id,respondent_name,respondent_state\n145,Public Service Company of Colorado,CO\n",
    )?;
    common::write_partition(
        settings,
        StagingTable::F1Steam,
        2015,
        b"respondent_id,spplmnt_num,row_number,plant_name,plant_kind,tot_capacity,net_generation,cost_land,cost_structure\n\
          145,0,1,Comanche,steam,1410,7500000000,100,200\n",
    )?;
    common::write_partition(
        settings,
        StagingTable::F1Fuel,
        2015,
        b"respondent_id,spplmnt_num,row_number,plant_name,fuel,fuel_unit,fuel_quantity,fuel_avg_heat\n\
          145,0,1,Comanche,Coal,Tons,100,18000000\n",
    )?;
    common::write_partition(
        settings,
        StagingTable::Eia860Utility,
        2015,
        b"utility_id,utility_name,state,entity_type\n15466,PSCo,CO,Investor Owned\n",
    )?;
    common::write_partition(
        settings,
        StagingTable::Eia860Plant,
        2015,
        b"plant_id,plant_name,utility_id,state,county\n470,Comanche Station,15466,CO,Pueblo\n",
    )?;
    common::write_partition(
        settings,
        StagingTable::Eia860Generator,
        2015,
        b"plant_id,generator_id,utility_id,prime_mover,nameplate_capacity_mw,energy_source_1\n\
          470,1,15466,ST,382.5,SUB\n\
          470,2,15466,ST,365.5,SUB\n",
    )?;
    common::write_partition(
        settings,
        StagingTable::Eia923GenerationFuel,
        2015,
        b"plant_id,report_month,prime_mover,fuel_type,plant_name,operator_id,operator_name,plant_state,net_generation_mwh\n\
          470,1,ST,SUB,Comanche,15466,Public Service Co of Colorado,CO,500000\n",
    )?;
    common::write_partition(
        settings,
        StagingTable::Eia923Generator,
        2015,
        b"plant_id,generator_id,report_month,net_generation_mwh\n\
          470,1,1,250000\n\
          88888,1,1,5\n",
    )?;
    common::write_mapping(settings, "utilities.csv", "respondent_id,utility_id_eia\n145,15466\n")?;
    common::write_mapping(settings, "plants.csv", "respondent_id,plant_name,plant_id_eia\n145,Comanche,470\n")?;
    Ok(())
}

fn plan() -> Result<SessionPlan> {
    let ferc1 = StagingRequest::new(
        TableSelection::parse(Source::Ferc1, ["f1_respondent_id", "f1_steam", "f1_fuel"])?,
        YearSpan::new(Source::Ferc1, [2015])?,
    )?;
    let tables = TableSelection::<IntegratedTable>::parse_any([
        "plants_steam_ferc1",
        "fuel_ferc1",
        "generators_eia860",
        "generation_fuel_eia923",
        "generation_eia923",
    ])?;
    let years = LoadYears::new()
        .with(YearSpan::new(Source::Ferc1, [2015])?)
        .with(YearSpan::new(Source::Eia923, [2015])?)
        .with(YearSpan::new(Source::Eia860, [2015])?);
    Ok(SessionPlan {
        ferc1,
        pudl: IntegratedRequest::new(tables, years),
    })
}

#[test]
fn test_session_builds_and_tears_down_both_databases() -> Result<()> {
    let dir = tempdir()?;
    let settings = common::settings(dir.path());
    write_2015_partitions(&settings)?;

    let session = Session::open(settings.clone(), &plan()?)?;
    assert_eq!(session.reports().len(), 2);
    assert!(session.ferc1_schema().is_none());
    let pudl_report = &session.reports()[1];
    assert_eq!(pudl_report.state, DbState::Populated);
    assert!(pudl_report.is_complete());

    let pudl = session.pudl();
    assert_eq!(pudl.row_count("utilities")?, 1);
    let (utility_name, entity_type): (String, String) = pudl.conn().query_row(
        "SELECT utility_name, entity_type FROM utilities",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    assert_eq!(utility_name, "Public Service Company of Colorado");
    assert_eq!(entity_type, "Investor Owned");

    assert_eq!(pudl.row_count("plants")?, 1);
    let (plant_id, plant_name): (i64, String) =
        pudl.conn()
            .query_row("SELECT plant_id_pudl, plant_name FROM plants", [], |r| Ok((r.get(0)?, r.get(1)?)))?;
    assert_eq!(plant_name, "Comanche Station");

    let (steam_plant, net_generation): (i64, f64) = pudl.conn().query_row(
        "SELECT plant_id_pudl, net_generation_mwh FROM plants_steam_ferc1",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    assert_eq!(steam_plant, plant_id);
    assert_eq!(net_generation, 7_500_000.0);

    let (fuel_type, unit, mmbtu): (String, String, f64) = pudl.conn().query_row(
        "SELECT fuel_type_code_pudl, fuel_unit, fuel_mmbtu_per_unit FROM fuel_ferc1",
        [],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;
    assert_eq!((fuel_type.as_str(), unit.as_str(), mmbtu), ("coal", "ton", 18.0));

    assert_eq!(pudl.row_count("generators_eia860")?, 2);
    assert_eq!(pudl.row_count("generation_fuel_eia923")?, 1);
    assert_eq!(pudl.row_count("generation_eia923")?, 1);
    let generation = pudl_report
        .load_for(IntegratedTable::GenerationEia923)
        .expect("generation report");
    assert_eq!(generation.orphan_count(), 1);
    assert_eq!(
        generation.exclusions[0].reason,
        ExclusionReason::Orphan {
            reference: "plant eia:88888".to_string()
        }
    );

    let dropped = session.close()?;
    assert!(dropped.iter().any(|t| t == "utilities"));
    assert!(dropped.iter().any(|t| t == "f1_fuel"));

    let provider = ConnectionProvider::new(&settings);
    for kind in [
        DatabaseKind::Staging(Source::Ferc1),
        DatabaseKind::Integrated,
        DatabaseKind::Staging(Source::Eia860),
        DatabaseKind::Staging(Source::Eia923),
    ] {
        let handle = provider.connect(kind, DbTarget::Test)?;
        assert!(handle.table_names()?.is_empty(), "{kind} still has tables");
    }
    Ok(())
}

#[test]
fn live_ferc1_feeds_a_test_integrated_database() -> Result<()> {
    let dir = tempdir()?;
    let mut settings = common::settings(dir.path());
    common::write_fuel_partitions(&settings)?;

    let live = dir.path().join("ferc1_live.sqlite");
    rusqlite::Connection::open(&live)?;
    settings.live.ferc1_db = Some(live.clone());
    settings.databases.ferc1 = DbTarget::Live;

    // Populate the live instance the way a production run would.
    let registry = Arc::new(SchemaRegistry::new()?);
    let provider = ConnectionProvider::new(&settings);
    let ferc1_request = StagingRequest::new(
        TableSelection::parse(Source::Ferc1, ["f1_respondent_id", "f1_fuel"])?,
        YearSpan::new(Source::Ferc1, [2009, 2010])?,
    )?;
    {
        let handle = provider.connect(DatabaseKind::Staging(Source::Ferc1), DbTarget::Live)?;
        let mut manager = LifecycleManager::new(handle, registry);
        let report = manager.init_staging(&ferc1_request, &FsPartitionSource::new(&settings.data_root), false)?;
        assert_eq!(report.state, DbState::HeldLive);
        assert_eq!(report.rows_extracted(), 9);
    }

    let plan = SessionPlan {
        ferc1: ferc1_request,
        pudl: IntegratedRequest::new(
            TableSelection::parse(Source::Ferc1, ["fuel_ferc1"])?,
            LoadYears::new().with(YearSpan::new(Source::Ferc1, [2009, 2010])?),
        ),
    };
    let session = Session::open(settings.clone(), &plan)?;
    assert_eq!(session.reports().len(), 1);
    assert!(session.ferc1_schema().is_some());
    assert_eq!(session.ferc1().ddl_issued(), 0);
    assert_eq!(session.pudl().row_count("fuel_ferc1")?, 5);
    assert_eq!(session.pudl().row_count("utilities")?, 2);

    session.close()?;
    let ferc1 = provider.connect(DatabaseKind::Staging(Source::Ferc1), DbTarget::Live)?;
    assert_eq!(ferc1.row_count("f1_fuel")?, 5);
    let pudl = provider.connect(DatabaseKind::Integrated, DbTarget::Test)?;
    assert!(pudl.table_names()?.is_empty());
    Ok(())
}
