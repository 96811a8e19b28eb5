//! Packs the default environment files into the gzip'd tarball that the
//! library embeds as its asset bundle.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::PathBuf;

fn main() {
    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap());
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").unwrap());
    let assets = manifest_dir.join("assets").join("dot_cardpeek");

    println!("cargo:rerun-if-changed={}", assets.display());

    let archive_path = out_dir.join("dot_cardpeek.tar.gz");
    let file = File::create(&archive_path).expect("create bundle archive");
    let encoder = GzEncoder::new(file, Compression::best());

    let mut builder = tar::Builder::new(encoder);
    // Entries are rooted at `.cardpeek/` so the bundle unpacks into the home directory.
    builder.mode(tar::HeaderMode::Deterministic);
    builder
        .append_dir_all(".cardpeek", &assets)
        .expect("pack default environment files");

    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .expect("finish bundle archive");
}
