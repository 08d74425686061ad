/*!
# Trendboard

COVID-19 trend and Iris dashboards computed as plain, chart-ready tables.

## Overview

The COVID-19 dashboard loads the ECDC geographic distribution CSV once,
normalizes case and death counts per million inhabitants, and derives every
chart from two user inputs: the metric (cases or deaths per million) and a
set of selected countries. The Iris dashboard is a fixed set of figures over
the Iris flower dataset.

## Architecture

### Table Loader
- Fetches the primary source with a single fallback (URL or local `.csv` / `.csv.gz`)
- Drops sparse columns, excludes the `Other` pseudo-continent and fills missing identifiers
- Validates the schema; violations are fatal at startup

### Aggregation Engine
- Daily sums per continent, last-day snapshot and per-continent totals
- Per-group cumulative series that reset at each group boundary
- Pivoting into date by group tables, missing pairs kept absent

### Reactive Binding Layer
- Input cells record the rules that read them (dependency tracking)
- Setting an input re-evaluates exactly its dependent rules, in rule order
- Outputs are published as one immutable set, swapped atomically

## Modules

- **table**: Base table, observations, metrics and group keys
- **loader**: Source fetching with fallback and schema validation
- **aggregate**: Grouped, snapshot, total and cumulative views
- **pivot**: Chart-ready series and slice tables
- **cell** / **reactive**: Input cells and the dataflow graph
- **dashboard**: The COVID-19 rule set
- **iris**: Iris figures
- **downloader**: CSV (and XLSX) export
- **saving**: Gzip + bincode snapshots of outputs
- **graph**: PNG rendering (feature `web`)
- **app**: HTTP API (feature `web`)

## REST API Endpoints (feature `web`)

- `GET /api/summary` - Date range, countries and continents
- `GET /api/inputs`, `POST /api/inputs/metric`, `POST /api/inputs/countries` - Input cells
- `GET /api/outputs`, `GET /api/outputs/{name}` - Chart-ready tables as JSON
- `GET /api/outputs/{name}/csv`, `GET /api/outputs/{name}/xlsx` - Downloads
- `GET /api/charts/{name}` - PNG rendering of an output
- `GET /api/export` - Gzip snapshot of every output
- `GET /api/iris`, `GET /api/iris/charts/{name}` - Iris figures
*/

pub mod aggregate;
pub mod app;
pub mod cell;
pub mod config;
pub mod dashboard;
pub mod downloader;
pub mod error;
pub mod graph;
pub mod iris;
pub mod loader;
pub mod pivot;
pub mod reactive;
pub mod saving;
pub mod table;

pub use dashboard::Dashboard;
pub use error::{Error, Result};
pub use pivot::ChartData;
pub use table::{GroupKey, Metric, Observation, Table};
