/// Data layer: core types, sample ingestion, cropping, and array containers.
///
/// Architecture:
/// ```text
///   exy<step>.csv  (3 header lines, x,y,ex,ey,ez)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse rows → SampleTable → FieldBundle
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │   crop    │  centered window, identical on all four grids
///   └──────────┘
///        │
///        ▼
///   ┌────────────┐
///   │ container   │  NamedArray ⇄ .parquet / .json
///   └────────────┘
/// ```

pub mod container;
pub mod crop;
pub mod loader;
pub mod model;
