/// Document URL used as the join key between corpus variants.
/// Example: `https://example.com/articles/intro.html`
pub type DocUrl = String;
/// Identifier for the corpus variant a table was fetched from.
/// Examples: `allenai/c4:en`, `allenai/c4:en.noclean`
pub type SourceId = String;
/// Dense per-run document identifier assigned after joining.
/// Example: `17`
pub type DocId = u64;
/// Registry project that groups dataset versions.
/// Example: `datasets/c4`
pub type ProjectName = String;
/// Registry dataset name shared by every version in a lineage.
/// Example: `c4_raw_clean`
pub type DatasetName = String;
/// Opaque registry version identifier.
/// Example: `000003-9f1c2a7e55d0b4a1`
pub type VersionId = String;
/// Remote or local shard file path relative to a corpus root.
/// Example: `en/c4-train.00000-of-01024.json.gz`
pub type PathString = String;
