//! Integration tests for the reporting pipeline.
//!
//! Builds a miniature two-scenario model on disk - item catalogs, commodity
//! groups, unit definitions and solver exports - then drives the schema,
//! allocation, trace and shares runs through the library entry points and
//! checks the written tables row by row.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use reflow::config::RunConfig;
use reflow::pipeline;
use reflow_core::ReflowError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =============================================================================
// FIXTURE MODEL
// =============================================================================
//
// A biodiesel chain feeding two end uses:
//
//   CT_COILBDS --BDSL--> FTE_DSLBLND --BDSLDSL--> T_O_CAR  --> T_O_MOB
//       |                     ^               \-> I_BOILER --> I_HEAT
//    TOTCO2 < 0              DSL
//
// The producer captures carbon (negative TOTCO2), the blender folds the
// biodiesel into the diesel pool, and the car and the boiler split the blend
// 62.5/37.5 in 2030 and 75/25 in 2035. Tui is Kea at half scale. The blender
// and the producer carry deliberately short catalog descriptions, so their
// own rows never reach the report and the generated allocation rows are the
// only place their quantities appear.

const COMMODITY_ITEMS: &str = "\
Commodity,Description,Set
DSL,Transport -:- Fuel -:- Diesel,NRG
BDSL,Transport -:- Fuel -:- Biodiesel,NRG
BDSLDSL,Transport -:- Fuel -:- Diesel,NRG
T_O_MOB,Transport -:- Road Transport -:- Mobility,DEM
I_HEAT,Industry -:- Manufacturing -:- Process Heat,DEM
TRACO2,Other -:- Emissions -:- Carbon Dioxide,ENV
INDCO2,Other -:- Emissions -:- Carbon Dioxide,ENV
TOTCO2,Other -:- Emissions -:- Carbon Dioxide,ENV
";

const PROCESS_ITEMS: &str = "\
Process,Description,Set
T_O_CAR,Transport -:- Road Transport -:- Mobility -:- Car -:- Diesel,.DMD.
I_BOILER,Industry -:- Manufacturing -:- Process Heat -:- Boiler -:- Diesel,.DMD.
FTE_DSLBLND,Other -:- Blending,PRE
CT_COILBDS,Other -:- Fuel Production,PRE
";

const COMMODITY_GROUPS: &str = "\
Process,Name,Member
CT_COILBDS,CT_COILBDS_NRGO,BDSL
CT_COILBDS,CT_COILBDS_ENVO,TOTCO2
FTE_DSLBLND,FTE_DSLBLND_NRGI,BDSL
FTE_DSLBLND,FTE_DSLBLND_NRGI,DSL
FTE_DSLBLND,FTE_DSLBLND_NRGO,BDSLDSL
T_O_CAR,T_O_CAR_NRGI,BDSLDSL
T_O_CAR,T_O_CAR_DEMO,T_O_MOB
T_O_CAR,T_O_CAR_ENVO,TRACO2
I_BOILER,I_BOILER_NRGI,BDSLDSL
I_BOILER,I_BOILER_DEMO,I_HEAT
I_BOILER,I_BOILER_ENVO,INDCO2
";

const UNIT_DEFINITIONS: &str = "\
* TIMES base model definitions
SET MILESTONYR / 2030, 2035 /;

SET COM_UNIT
/
'NI'.'DSL'.'PJ'
'NI'.'BDSL'.'PJ'
'NI'.'BDSLDSL'.'PJ'
'NI'.'I_HEAT'.'PJ'
'NI'.'T_O_MOB'.'BVkm'
'NI'.'TRACO2'.'kt'
'NI'.'INDCO2'.'kt'
'NI'.'TOTCO2'.'kt'
'SI'.'DSL'.'PJ'
/
";

const VD_HEADER: &str = "\
* VEDA-TIMES export
* ImportID- 20260501120000
* Dimensions- Attribute;Commodity;Process;Period;Region;Vintage;TimeSlice;UserConstraint;PV
";

fn export(rows: &[(&str, &str, &str, &str, &str, f64)]) -> String {
    let mut text = String::from(VD_HEADER);
    for (attribute, commodity, process, period, region, value) in rows {
        text.push_str(&format!(
            "\"{attribute}\",\"{commodity}\",\"{process}\",\"{period}\",\"{region}\",\"{period}\",\"ANNUAL\",\"-\",\"{value}\"\n"
        ));
    }
    text
}

fn kea_export() -> String {
    export(&[
        // 2030: 10 PJ of biodiesel, split across the islands.
        ("VAR_FOut", "BDSL", "CT_COILBDS", "2030", "NI", 6.0),
        ("VAR_FOut", "BDSL", "CT_COILBDS", "2030", "SI", 4.0),
        ("VAR_FOut", "TOTCO2", "CT_COILBDS", "2030", "NI", -5.0),
        ("VAR_FIn", "BDSL", "FTE_DSLBLND", "2030", "NI", 10.0),
        ("VAR_FIn", "DSL", "FTE_DSLBLND", "2030", "NI", 30.0),
        ("VAR_FOut", "BDSLDSL", "FTE_DSLBLND", "2030", "NI", 40.0),
        ("VAR_FIn", "BDSLDSL", "T_O_CAR", "2030", "NI", 25.0),
        ("VAR_FOut", "T_O_MOB", "T_O_CAR", "2030", "NI", 25.0),
        ("VAR_FOut", "TRACO2", "T_O_CAR", "2030", "NI", 50.0),
        ("VAR_FIn", "BDSLDSL", "I_BOILER", "2030", "NI", 15.0),
        ("VAR_FOut", "I_HEAT", "I_BOILER", "2030", "NI", 12.0),
        ("VAR_FOut", "INDCO2", "I_BOILER", "2030", "NI", 20.0),
        ("VAR_Cap", "-", "T_O_CAR", "2030", "NI", 100.0),
        ("VAR_Cap", "-", "I_BOILER", "2030", "NI", 3.0),
        // 2035: more of the blend goes to the car; no capacity rows, so the
        // report has to zero-fill the vehicle fleet for this period.
        ("VAR_FOut", "BDSL", "CT_COILBDS", "2035", "NI", 8.0),
        ("VAR_FOut", "TOTCO2", "CT_COILBDS", "2035", "NI", -4.0),
        ("VAR_FIn", "BDSL", "FTE_DSLBLND", "2035", "NI", 8.0),
        ("VAR_FIn", "DSL", "FTE_DSLBLND", "2035", "NI", 32.0),
        ("VAR_FOut", "BDSLDSL", "FTE_DSLBLND", "2035", "NI", 40.0),
        ("VAR_FIn", "BDSLDSL", "T_O_CAR", "2035", "NI", 30.0),
        ("VAR_FOut", "T_O_MOB", "T_O_CAR", "2035", "NI", 30.0),
        ("VAR_FOut", "TRACO2", "T_O_CAR", "2035", "NI", 55.0),
        ("VAR_FIn", "BDSLDSL", "I_BOILER", "2035", "NI", 10.0),
        ("VAR_FOut", "I_HEAT", "I_BOILER", "2035", "NI", 8.0),
        ("VAR_FOut", "INDCO2", "I_BOILER", "2035", "NI", 15.0),
        // Filtered on read: a cost row, a calibration year, a sequestration
        // accounting commodity. Any leak would break the period axis and the
        // row counts below.
        ("Cost_Inv", "-", "CT_COILBDS", "2030", "NI", 815.0),
        ("VAR_FIn", "DSL", "FTE_DSLBLND", "2016", "NI", 99.0),
        ("VAR_FIn", "COseq", "CCS_PLANT", "2030", "NI", 7.0),
    ])
}

fn tui_export() -> String {
    export(&[
        ("VAR_FOut", "BDSL", "CT_COILBDS", "2030", "NI", 5.0),
        ("VAR_FOut", "TOTCO2", "CT_COILBDS", "2030", "NI", -2.5),
        ("VAR_FIn", "BDSL", "FTE_DSLBLND", "2030", "NI", 5.0),
        ("VAR_FIn", "DSL", "FTE_DSLBLND", "2030", "NI", 15.0),
        ("VAR_FOut", "BDSLDSL", "FTE_DSLBLND", "2030", "NI", 20.0),
        ("VAR_FIn", "BDSLDSL", "T_O_CAR", "2030", "NI", 12.5),
        ("VAR_FOut", "T_O_MOB", "T_O_CAR", "2030", "NI", 12.5),
        ("VAR_FOut", "TRACO2", "T_O_CAR", "2030", "NI", 25.0),
        ("VAR_FIn", "BDSLDSL", "I_BOILER", "2030", "NI", 7.5),
        ("VAR_FOut", "I_HEAT", "I_BOILER", "2030", "NI", 6.0),
        ("VAR_FOut", "INDCO2", "I_BOILER", "2030", "NI", 10.0),
        ("VAR_Cap", "-", "T_O_CAR", "2030", "NI", 50.0),
        ("VAR_Cap", "-", "I_BOILER", "2030", "NI", 1.5),
        ("VAR_FOut", "BDSL", "CT_COILBDS", "2035", "NI", 4.0),
        ("VAR_FOut", "TOTCO2", "CT_COILBDS", "2035", "NI", -2.0),
        ("VAR_FIn", "BDSL", "FTE_DSLBLND", "2035", "NI", 4.0),
        ("VAR_FIn", "DSL", "FTE_DSLBLND", "2035", "NI", 16.0),
        ("VAR_FOut", "BDSLDSL", "FTE_DSLBLND", "2035", "NI", 20.0),
        ("VAR_FIn", "BDSLDSL", "T_O_CAR", "2035", "NI", 15.0),
        ("VAR_FOut", "T_O_MOB", "T_O_CAR", "2035", "NI", 15.0),
        ("VAR_FOut", "TRACO2", "T_O_CAR", "2035", "NI", 27.5),
        ("VAR_FIn", "BDSLDSL", "I_BOILER", "2035", "NI", 5.0),
        ("VAR_FOut", "I_HEAT", "I_BOILER", "2035", "NI", 4.0),
        ("VAR_FOut", "INDCO2", "I_BOILER", "2035", "NI", 7.5),
        ("VAR_Cap", "-", "T_O_CAR", "2035", "NI", 50.0),
        ("VAR_Cap", "-", "I_BOILER", "2035", "NI", 1.5),
    ])
}

/// Write the whole model under `root` and return the configuration path.
fn write_model(root: &Path) -> PathBuf {
    let model = root.join("model");
    let exports = root.join("exports");
    fs::create_dir_all(&model).unwrap();
    fs::create_dir_all(&exports).unwrap();

    fs::write(model.join("commodity_items.csv"), COMMODITY_ITEMS).unwrap();
    fs::write(model.join("process_items.csv"), PROCESS_ITEMS).unwrap();
    fs::write(model.join("commodity_groups.csv"), COMMODITY_GROUPS).unwrap();
    fs::write(model.join("base.dd"), UNIT_DEFINITIONS).unwrap();
    fs::write(exports.join("kea.vd"), kea_export()).unwrap();
    fs::write(exports.join("tui.vd"), tui_export()).unwrap();

    let config = format!(
        r#"[scenarios]
Kea = "{exports}/kea.vd"
Tui = "{exports}/tui.vd"

[inputs]
commodity_items = "{model}/commodity_items.csv"
process_items = "{model}/process_items.csv"
commodity_groups = "{model}/commodity_groups.csv"
unit_definitions = "{model}/base.dd"
output = "{out}/report.csv"
schema_output = "{out}/schema.csv"

[[allocation.substitutions]]
commodity = "BDSL"
displaced_fuel = "Diesel"
"#,
        exports = exports.display(),
        model = model.display(),
        out = root.join("out").display(),
    );
    let path = root.join("reflow.toml");
    fs::write(&path, config).unwrap();
    path
}

fn load_fixture(root: &Path) -> RunConfig {
    RunConfig::load(&write_model(root)).unwrap()
}

// =============================================================================
// OUTPUT READING
// =============================================================================

/// Every cell in the written tables is quoted, and no fixture label embeds a
/// quote or comma, so splitting on the quoted separator is enough.
fn split_cells(line: &str) -> Vec<String> {
    line.trim_start_matches('"')
        .trim_end_matches('"')
        .split("\",\"")
        .map(str::to_string)
        .collect()
}

fn read_rows(path: &Path) -> Vec<BTreeMap<String, String>> {
    let text = fs::read_to_string(path).unwrap();
    let mut lines = text.lines();
    let columns = split_cells(lines.next().expect("header row"));
    lines
        .map(|line| columns.iter().cloned().zip(split_cells(line)).collect())
        .collect()
}

fn find_row<'a>(
    rows: &'a [BTreeMap<String, String>],
    want: &[(&str, &str)],
) -> &'a BTreeMap<String, String> {
    let hits: Vec<&BTreeMap<String, String>> = rows
        .iter()
        .filter(|row| {
            want.iter()
                .all(|(column, expected)| row.get(*column).map(String::as_str) == Some(*expected))
        })
        .collect();
    assert_eq!(hits.len(), 1, "want exactly one row matching {want:?}");
    hits[0]
}

fn value_of(rows: &[BTreeMap<String, String>], want: &[(&str, &str)]) -> f64 {
    find_row(rows, want)["Value"].parse().unwrap()
}

fn run_report(root: &Path) -> (pipeline::AllocationSummary, Vec<BTreeMap<String, String>>) {
    let config = load_fixture(root);
    let summary = pipeline::run_allocation(&config).unwrap();
    let rows = read_rows(&config.inputs.output);
    (summary, rows)
}

// =============================================================================
// SCHEMA RUN
// =============================================================================

#[test]
fn schema_run_writes_every_labelled_flow() {
    let dir = TempDir::new().unwrap();
    let config = load_fixture(dir.path());

    let summary = pipeline::run_schema(&config).unwrap();
    assert_eq!(summary.rows, 8);

    let text = fs::read_to_string(&config.inputs.schema_output).unwrap();
    assert!(text.starts_with(
        "\"Attribute\",\"Process\",\"Commodity\",\"Sector\",\"Subsector\",\"Technology\",\
         \"Fuel\",\"Enduse\",\"Unit\",\"Parameters\",\"FuelGroup\"\n"
    ));

    let rows = read_rows(&config.inputs.schema_output);
    assert_eq!(rows.len(), 8);

    // Only the catalogued demand processes survive the completeness filter;
    // the producer and the blender have no full description.
    assert!(rows
        .iter()
        .all(|row| row["Process"] == "T_O_CAR" || row["Process"] == "I_BOILER"));
    assert_eq!(rows.iter().filter(|row| row["Process"] == "T_O_CAR").count(), 4);

    let fuel = find_row(&rows, &[("Attribute", "VAR_FIn"), ("Process", "T_O_CAR")]);
    assert_eq!(fuel["Commodity"], "BDSLDSL");
    assert_eq!(fuel["Sector"], "Transport");
    assert_eq!(fuel["Subsector"], "Road Transport");
    assert_eq!(fuel["Technology"], "Car");
    assert_eq!(fuel["Fuel"], "Diesel");
    assert_eq!(fuel["Enduse"], "Mobility");
    assert_eq!(fuel["Unit"], "PJ");
    assert_eq!(fuel["Parameters"], "Fuel Consumption");
    assert_eq!(fuel["FuelGroup"], "Fossil Fuels");

    let demand = find_row(&rows, &[("Process", "T_O_CAR"), ("Commodity", "T_O_MOB")]);
    assert_eq!(demand["Unit"], "Billion Vehicle Kilometres");
    assert_eq!(demand["Parameters"], "Distance Travelled");

    // Declared capacities arrive via the group skeleton with the placeholder
    // commodity; the schema keeps the capacity parameter the report drops.
    let car_cap = find_row(&rows, &[("Attribute", "VAR_Cap"), ("Process", "T_O_CAR")]);
    assert_eq!(car_cap["Commodity"], "-");
    assert_eq!(car_cap["Unit"], "000 Vehicles");
    assert_eq!(car_cap["Parameters"], "Number of Vehicles");

    let boiler_cap = find_row(&rows, &[("Attribute", "VAR_Cap"), ("Process", "I_BOILER")]);
    assert_eq!(boiler_cap["Unit"], "GW");
    assert_eq!(boiler_cap["Parameters"], "Technology Capacity");
}

// =============================================================================
// ALLOCATION RUN
// =============================================================================

#[test]
fn allocation_moves_captured_carbon_to_the_end_uses() {
    let dir = TempDir::new().unwrap();
    let (summary, rows) = run_report(dir.path());

    // 4 negative TOTCO2 rows out; per scenario and period, 2 emission
    // allocations plus 2 consumption rows plus 2 mirrors back in.
    assert_eq!(summary.rows, 44);
    assert_eq!(summary.dropped_rows, 4);
    assert_eq!(summary.added_rows, 24);
    assert_eq!(rows.len(), 44);

    // The captured -5.0 lands at the end uses, split 62.5/37.5 by their
    // consumption of the blend, under each sector's emission label.
    let transport = value_of(
        &rows,
        &[
            ("Scenario", "Kea"),
            ("Period", "2030"),
            ("Sector", "Transport"),
            ("Parameters", "Emissions"),
            ("Fuel", "Biodiesel"),
        ],
    );
    assert!((transport + 3.125).abs() < 1e-9);
    let industry = value_of(
        &rows,
        &[
            ("Scenario", "Kea"),
            ("Period", "2030"),
            ("Sector", "Industry"),
            ("Parameters", "Emissions"),
            ("Fuel", "Biodiesel"),
        ],
    );
    assert!((industry + 1.875).abs() < 1e-9);

    // 2035 shifts the split to 75/25.
    let transport_2035 = value_of(
        &rows,
        &[
            ("Scenario", "Kea"),
            ("Period", "2035"),
            ("Sector", "Transport"),
            ("Parameters", "Emissions"),
            ("Fuel", "Biodiesel"),
        ],
    );
    assert!((transport_2035 + 3.0).abs() < 1e-9);

    // Combustion emissions pass through untouched.
    let combustion = value_of(
        &rows,
        &[
            ("Scenario", "Kea"),
            ("Period", "2030"),
            ("Sector", "Transport"),
            ("Parameters", "Emissions"),
            ("Fuel", "Diesel"),
        ],
    );
    assert!((combustion - 50.0).abs() < 1e-9);

    // Tui runs the same chain at half scale.
    let tui = value_of(
        &rows,
        &[
            ("Scenario", "Tui"),
            ("Period", "2030"),
            ("Sector", "Transport"),
            ("Parameters", "Emissions"),
            ("Fuel", "Biodiesel"),
        ],
    );
    assert!((tui + 1.5625).abs() < 1e-9);

    let allocated: f64 = rows
        .iter()
        .filter(|row| row["Parameters"] == "Emissions" && row["Fuel"] == "Biodiesel")
        .map(|row| row["Value"].parse::<f64>().unwrap())
        .sum();
    assert!((allocated + 13.5).abs() < 1e-9);

    // The supply chain itself never reaches the report.
    assert!(rows.iter().all(|row| row["Subsector"] != "Fuel"));
    assert!(rows.iter().all(|row| row["Subsector"] != "Blending"));
}

#[test]
fn substituted_fuel_displaces_fossil_consumption() {
    let dir = TempDir::new().unwrap();
    let (_, rows) = run_report(dir.path());

    // The car consumed 25 PJ of blend in Kea 2030; 6.25 of that is biodiesel
    // now reported under its own fuel label, and the mirror rows back the
    // same amount out of diesel.
    let car_diesel = value_of(
        &rows,
        &[
            ("Scenario", "Kea"),
            ("Period", "2030"),
            ("Sector", "Transport"),
            ("Parameters", "Fuel Consumption"),
            ("Fuel", "Diesel"),
        ],
    );
    assert!((car_diesel - 18.75).abs() < 1e-9);

    let car_biodiesel = find_row(
        &rows,
        &[
            ("Scenario", "Kea"),
            ("Period", "2030"),
            ("Sector", "Transport"),
            ("Parameters", "Fuel Consumption"),
            ("Fuel", "Biodiesel"),
        ],
    );
    assert_eq!(car_biodiesel["FuelGroup"], "Renewables (direct use)");
    assert_eq!(car_biodiesel["Enduse"], "Mobility");
    assert_eq!(car_biodiesel["Technology"], "Car");
    let car_biodiesel: f64 = car_biodiesel["Value"].parse().unwrap();
    assert!((car_biodiesel - 6.25).abs() < 1e-9);

    let boiler_diesel = value_of(
        &rows,
        &[
            ("Scenario", "Kea"),
            ("Period", "2030"),
            ("Sector", "Industry"),
            ("Parameters", "Fuel Consumption"),
            ("Fuel", "Diesel"),
        ],
    );
    assert!((boiler_diesel - 11.25).abs() < 1e-9);
    let boiler_biodiesel = value_of(
        &rows,
        &[
            ("Scenario", "Kea"),
            ("Period", "2030"),
            ("Sector", "Industry"),
            ("Parameters", "Fuel Consumption"),
            ("Fuel", "Biodiesel"),
        ],
    );
    assert!((boiler_biodiesel - 3.75).abs() < 1e-9);

    // Reported biodiesel consumption equals the 10 PJ produced, and the total
    // fuel bill per period is unchanged by the reshuffle.
    assert!((car_biodiesel + boiler_biodiesel - 10.0).abs() < 1e-9);
    assert!((car_diesel + boiler_diesel + 10.0 - 40.0).abs() < 1e-9);

    let tui_2035 = value_of(
        &rows,
        &[
            ("Scenario", "Tui"),
            ("Period", "2035"),
            ("Sector", "Industry"),
            ("Parameters", "Fuel Consumption"),
            ("Fuel", "Biodiesel"),
        ],
    );
    assert!((tui_2035 - 1.0).abs() < 1e-9);
}

#[test]
fn capacity_rows_survive_reshaping_with_filled_periods() {
    let dir = TempDir::new().unwrap();
    let (_, rows) = run_report(dir.path());

    // The boiler's GW capacity is one of the parameters the final relabels
    // remove; the vehicle fleet stays, with its unit spelled out.
    assert!(rows.iter().all(|row| row["Parameters"] != "Technology Capacity"));

    let fleet: Vec<&BTreeMap<String, String>> = rows
        .iter()
        .filter(|row| row["Parameters"] == "Number of Vehicles")
        .collect();
    assert_eq!(fleet.len(), 4);
    assert!(fleet
        .iter()
        .all(|row| row["Unit"] == "Number of Vehicles (Thousands)"));

    let kea_2030 = value_of(
        &rows,
        &[
            ("Scenario", "Kea"),
            ("Period", "2030"),
            ("Parameters", "Number of Vehicles"),
        ],
    );
    assert!((kea_2030 - 100.0).abs() < 1e-9);

    // Kea has no 2035 capacity row in the export; the report pads the
    // category with a zero instead of leaving a gap in the period axis.
    let kea_2035 = value_of(
        &rows,
        &[
            ("Scenario", "Kea"),
            ("Period", "2035"),
            ("Parameters", "Number of Vehicles"),
        ],
    );
    assert!(kea_2035.abs() < 1e-9);

    let tui_2035 = value_of(
        &rows,
        &[
            ("Scenario", "Tui"),
            ("Period", "2035"),
            ("Parameters", "Number of Vehicles"),
        ],
    );
    assert!((tui_2035 - 50.0).abs() < 1e-9);
}

// =============================================================================
// TRACE AND SHARES
// =============================================================================

#[test]
fn trace_follows_the_blend_to_terminal_demands() {
    let dir = TempDir::new().unwrap();
    let config = load_fixture(dir.path());

    let paths = pipeline::run_trace(&config, "CT_COILBDS", "Kea", "2030").unwrap();
    assert_eq!(paths.len(), 2);
    let total: f64 = paths.values().sum();
    assert!((total - 1.0).abs() < 1e-9);

    let (car, fraction) = paths
        .iter()
        .find(|(path, _)| path.last_commodity() == Some("T_O_MOB"))
        .expect("path to mobility demand");
    assert!((fraction - 0.625).abs() < 1e-9);
    assert_eq!(car.source_process(), Some("CT_COILBDS"));
    assert_eq!(car.traced_commodity(), Some("BDSL"));
    assert_eq!(car.last_process(), Some("T_O_CAR"));
    assert_eq!(
        car.to_string(),
        "CT_COILBDS -> BDSL -> FTE_DSLBLND -> BDSLDSL -> T_O_CAR -> T_O_MOB"
    );

    let (_, fraction) = paths
        .iter()
        .find(|(path, _)| path.last_commodity() == Some("I_HEAT"))
        .expect("path to process heat demand");
    assert!((fraction - 0.375).abs() < 1e-9);
}

#[test]
fn shares_split_the_blender_output_across_end_uses() {
    let dir = TempDir::new().unwrap();
    let config = load_fixture(dir.path());

    let shares = pipeline::run_shares(&config, "FTE_DSLBLND", "Kea", "2035", None).unwrap();
    assert_eq!(shares.len(), 2);

    let car = shares
        .iter()
        .find(|share| share.process == "T_O_CAR")
        .expect("car share");
    assert!((car.value.unwrap() - 0.75).abs() < 1e-9);
    assert_eq!(car.commodity.as_deref(), Some("BDSLDSL"));
    assert_eq!(car.fuel_source.as_deref(), Some("FTE_DSLBLND"));

    let boiler = shares
        .iter()
        .find(|share| share.process == "I_BOILER")
        .expect("boiler share");
    assert!((boiler.value.unwrap() - 0.25).abs() < 1e-9);

    // Filtering by traced commodity from further up the chain gives the same
    // split the allocation used.
    let filtered =
        pipeline::run_shares(&config, "CT_COILBDS", "Kea", "2030", Some("BDSL")).unwrap();
    let car = filtered
        .iter()
        .find(|share| share.process == "T_O_CAR")
        .expect("car share");
    assert!((car.value.unwrap() - 0.625).abs() < 1e-9);
}

// =============================================================================
// FAILURE MODES
// =============================================================================

#[test]
fn missing_export_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let path = write_model(dir.path());
    fs::remove_file(dir.path().join("exports").join("kea.vd")).unwrap();

    let config = RunConfig::load(&path).unwrap();
    assert!(matches!(
        pipeline::run_schema(&config),
        Err(ReflowError::IoError(_))
    ));
}
