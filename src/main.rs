//! Offset Workbench
//!
//! Interactive front end for the offset-site workflow: browse facilities on
//! the map, run a suitability analysis, pick sites, and generate a brief.
//! Pass `--offline` to run against the built-in scripted backend.

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::info;

use offset_workbench::analysis::AnalysisOutcome;
use offset_workbench::api::mock::MockBackend;
use offset_workbench::api::{BackendApi, FacilityRecord, HttpBackend};
use offset_workbench::brief::{BriefReport, ImpactSummary};
use offset_workbench::credits::{self, CreditFactors};
use offset_workbench::handoff::{FileHandoffStore, HandoffStore};
use offset_workbench::map::FacilityMap;
use offset_workbench::notify::{Level, NotificationCenter, Notifier};
use offset_workbench::params::{parse_buffer_input, Constraint, ProjectType};
use offset_workbench::telemetry::init_tracing;
use offset_workbench::viewport::{Bounds, ViewportTracker};
use offset_workbench::workflow::CreditBuilder;
use offset_workbench::{Route, WorkbenchConfig, WorkflowError};

const HELP: &str = "\
Commands:
  open <facility>              load a facility and analyze
  type <reforestation|wetland|grassland>
  buffer <km>                  search radius, clamped to 0-50
  constraint <name>            toggle water_buffer | slope_limit | exclude_infrastructure | warn_indigenous
  list                         show candidate sites
  toggle <site>                select or deselect a site
  clear                        clear the selection
  brief                        generate the brief for the selection
  view <w> <s> <e> <n> <zoom>  move the map
  conserved                    toggle protected-area overlay
  search <text>                search facilities
  top                          top polluters
  select <facility>            details for a facility from the last listing
  refresh                      drop cached map data
  calc <area_ha>               credit estimate for the current project type
  quit";

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();
    init_tracing("offset_workbench=info")?;

    let config = WorkbenchConfig::from_env();
    let offline = std::env::args().any(|arg| arg == "--offline");

    let api: Arc<dyn BackendApi> = if offline {
        info!("Using scripted offline backend");
        Arc::new(MockBackend::new())
    } else {
        info!("Using backend at {}", config.api_url);
        Arc::new(HttpBackend::new(&config.api_url, config.request_timeout).context("Failed to build HTTP client")?)
    };

    let center = Arc::new(NotificationCenter::new());
    let mut notifications = center.subscribe();
    tokio::spawn(async move {
        while let Ok(n) = notifications.recv().await {
            let icon = match n.level {
                Level::Info => "ℹ️ ",
                Level::Error => "❌",
            };
            match n.description {
                Some(description) => println!("{} {}: {}", icon, n.title, description),
                None => println!("{} {}", icon, n.title),
            }
        }
    });
    let notifier: Arc<dyn Notifier> = center;

    let store: Arc<dyn HandoffStore> = Arc::new(FileHandoffStore::new(&config.handoff_file));
    let builder = CreditBuilder::new(api.clone(), notifier.clone(), store.clone());
    let report = BriefReport::new(api.clone(), notifier.clone(), store);
    let mut map = FacilityMap::new(api, notifier, &config);
    let (mut tracker, mut settled) = ViewportTracker::new(config.debounce);
    // Facilities from the last view, search or top listing
    let mut listed: Vec<FacilityRecord> = Vec::new();

    println!("\n{}", "═".repeat(60));
    println!("🌲 Offset Workbench v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", "═".repeat(60));
    println!("{}\n", HELP);

    loop {
        print!("offset> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let mut words = input.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let args: Vec<&str> = words.collect();

        match command.to_lowercase().as_str() {
            "quit" | "exit" | "q" => {
                println!("\n👋 Goodbye!\n");
                break;
            }
            "help" => println!("{}", HELP),
            "open" => match builder.open(args.first().copied()).await {
                Ok(outcome) => {
                    if let Some(facility) = builder.facility() {
                        println!("🏭 {} ({}) {:.0} tCO₂e", facility.facility.name, facility.facility.province, facility.facility.co2e_2023);
                    }
                    println!("{:?}", outcome);
                    print_sites(&builder);
                }
                Err(e) => print_redirect(&e, args.first().copied()),
            },
            "type" => {
                let Some(project_type) = args.first().and_then(|a| a.parse::<ProjectType>().ok()) else {
                    println!("Usage: type <reforestation|wetland|grassland>");
                    continue;
                };
                let outcome = builder.set_project_type(project_type).await;
                report_reanalysis(&builder, outcome);
            }
            "buffer" => {
                let km = parse_buffer_input(args.first().copied().unwrap_or(""));
                let outcome = builder.set_buffer_km(km).await;
                report_reanalysis(&builder, outcome);
            }
            "constraint" => {
                let Some(constraint) = args.first().and_then(|a| a.parse::<Constraint>().ok()) else {
                    println!("Usage: constraint <water_buffer|slope_limit|exclude_infrastructure|warn_indigenous>");
                    continue;
                };
                let outcome = builder.toggle_constraint(constraint).await;
                report_reanalysis(&builder, outcome);
            }
            "list" => print_sites(&builder),
            "toggle" => {
                for id in &args {
                    let selected = builder.toggle_polygon(id);
                    println!("{} {}", if selected { "✓" } else { "○" }, id);
                }
                println!(
                    "Selected {} site(s), {:.0} tCO₂e/yr",
                    builder.selected_count(),
                    builder.total_estimated_credits()
                );
            }
            "clear" => {
                builder.clear_selection();
                println!("Selection cleared.");
            }
            "brief" => {
                let route = match builder.generate_brief().await {
                    Ok(route) => route,
                    Err(e) => {
                        println!("⚠️  {}", e);
                        continue;
                    }
                };
                println!("➡️  {}\n", route);
                match report.load(&route.to_string()).await {
                    Ok(brief) => {
                        let summary = ImpactSummary::from_metadata(&brief.metadata);
                        println!("{}", "─".repeat(50));
                        println!("{}", brief.brief_markdown);
                        println!(
                            "{:.0} tCO₂e over {} years, {:.1} ha, {:.1}% of emissions",
                            summary.co2_removal, summary.timeline_years, summary.total_area_ha, summary.offset_percentage
                        );
                        println!("{}\n", "─".repeat(50));
                    }
                    Err(e) => {
                        let facility = builder.facility().map(|f| f.id().to_string());
                        print_redirect(&e, facility.as_deref());
                    }
                }
            }
            "view" => {
                let numbers: Vec<f64> = args.iter().filter_map(|a| a.parse().ok()).collect();
                let [west, south, east, north, zoom] = numbers[..] else {
                    println!("Usage: view <west> <south> <east> <north> <zoom>");
                    continue;
                };
                tracker.on_viewport_change(Bounds::new(west, south, east, north), zoom);
                let viewport = settled.recv().await.context("Viewport tracker closed")?;
                match map.apply_viewport(viewport).await {
                    Ok(_) if viewport.is_none() => println!("Zoom in to see facilities."),
                    Ok(points) => {
                        for p in &points {
                            println!("  {:<10} {:<40} {:>12.0} tCO₂e", p.id, p.name, p.co2e_2023);
                        }
                        println!("{} facilities in view", points.len());
                        listed = points.into_iter().map(FacilityRecord::from).collect();
                    }
                    Err(e) => println!("⚠️  {}", e),
                }
                if let Ok(areas) = map.protected_areas_in_view().await {
                    for area in areas {
                        println!("  🛡️  {} ({})", area.name, area.kind);
                    }
                }
            }
            "conserved" => {
                let show = !map.show_conserved_areas();
                map.set_show_conserved_areas(show);
                println!("Protected areas {}", if show { "shown" } else { "hidden" });
            }
            "search" => {
                let facilities = map.search(&args.join(" ")).await;
                for f in &facilities {
                    println!("  {:<10} {} ({})", f.id, f.name, f.province);
                }
                listed = facilities.into_iter().map(FacilityRecord::from).collect();
            }
            "select" => {
                let Some(record) = args.first().and_then(|id| listed.iter().find(|r| r.id() == *id)).cloned() else {
                    println!("Usage: select <facility id from the last listing>");
                    continue;
                };
                let (lng, lat) = record.position();
                println!("📍 {} at {:.3}, {:.3}", record.name(), lat, lng);
                if let Some(detail) = map.select_facility(record).await {
                    let history: Vec<String> = detail
                        .emissions_history
                        .iter()
                        .map(|e| format!("{} {:.0}", e.year, e.co2e))
                        .collect();
                    println!("   NAICS {} | OBPS covered: {}", detail.facility.naics_code, detail.obps_status.covered);
                    println!("   Emissions: {}", history.join(", "));
                    listed = vec![FacilityRecord::from(detail)];
                }
            }
            "refresh" => {
                map.refresh();
                println!("Map caches cleared.");
            }
            "top" => match map.top_polluters().await {
                Ok(facilities) => {
                    for (rank, f) in facilities.iter().enumerate() {
                        println!("  {}. {:<10} {:<40} {:>12.0} tCO₂e", rank + 1, f.id, f.name, f.co2e_2023);
                    }
                    listed = facilities.into_iter().map(FacilityRecord::from).collect();
                }
                Err(e) => println!("⚠️  {}", e),
            },
            "calc" => {
                let Some(area) = args.first().and_then(|a| a.parse::<f64>().ok()) else {
                    println!("Usage: calc <area_ha>");
                    continue;
                };
                let project_type = builder.params().project_type;
                let factors = CreditFactors::defaults_for(project_type);
                let result = credits::calculate(area, factors);
                println!(
                    "{:.1} ha × {} × {} × {} × 100 = {:.0} tCO₂e/yr",
                    result.area_ha, result.seq_factor, result.permanence, result.survival, result.total_credits
                );
                println!("Source: {}", credits::protocol_citation(project_type));
            }
            other => println!("Unknown command '{}'. Type 'help'.", other),
        }
    }

    Ok(())
}

fn report_reanalysis(builder: &CreditBuilder, outcome: Option<AnalysisOutcome>) {
    match outcome {
        Some(outcome) => {
            println!("{:?}", outcome);
            print_sites(builder);
        }
        None => println!("No change. Parameters: {:?}", builder.params()),
    }
}

fn print_sites(builder: &CreditBuilder) {
    let polygons = builder.polygons();
    let (total_area, avg_score) = builder.coordinator().summary();
    println!(
        "{} site(s), {:.1} ha total, average suitability {:.2}{}",
        polygons.len(),
        total_area,
        avg_score,
        if builder.is_analyzing() { " (updating)" } else { "" }
    );
    for p in polygons.iter() {
        let mark = if builder.is_selected(&p.id) { "✓" } else { "○" };
        println!(
            "  {} {:<24} {:>8.1} ha  score {:.2}  {:>8.0} tCO₂e/yr",
            mark, p.id, p.area_ha, p.suitability_score, p.est_credits_mid
        );
        for warning in &p.constraints_warnings {
            println!("      ⚠️  {}", warning);
        }
    }
}

fn print_redirect(err: &WorkflowError, facility_id: Option<&str>) {
    match err.redirect(facility_id) {
        Some(Route::Map) => println!("⚠️  {} (back to the map)", err),
        Some(route) => println!("⚠️  {} (back to {})", err, route),
        None => println!("⚠️  {}", err),
    }
}
