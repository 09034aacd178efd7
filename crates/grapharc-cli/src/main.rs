//! grapharc - round-trip demonstrations for the object-graph archive
//!
//! Each subcommand builds a sample object graph, archives it over a file or
//! a loopback socket, reloads it and checks that the structure survived.

mod demo;
mod draw;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use demo::{Entry, Peer, Sample};
use draw::draw;
use grapharc_core::{
    Archive, FileTransport, Mode, TcpTransport, Transport, TypeRegistry, XorFilter,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::fs;
use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::thread;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// Round-trip demonstrations for the grapharc object-graph archive
#[derive(Parser, Debug)]
#[command(name = "grapharc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Archive a fifteen node tree mixing two node types
    Tree(TreeArgs),
    /// Archive a fully connected graph over a file and a socket
    Mesh(MeshArgs),
    /// Pass a search tree back and forth over one socket
    #[command(name = "twoway")]
    TwoWay(TwoWayArgs),
    /// Archive a tree whose nodes hold every field category
    #[command(name = "alltypes")]
    AllTypes(AllTypesArgs),
}

#[derive(Args, Debug)]
struct TreeArgs {
    /// Archive file to write and read back
    #[arg(short, long, default_value = "tree.arc")]
    file: PathBuf,

    /// XOR every archived byte with this mask (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_mask)]
    mask: Option<u8>,

    /// Draw missing children next to present ones
    #[arg(long)]
    nulls: bool,
}

#[derive(Args, Debug)]
struct MeshArgs {
    /// Archive file used by the file round trip
    #[arg(short, long, default_value = "mesh.arc")]
    file: PathBuf,

    /// Which transports to exercise
    #[arg(long, value_enum, default_value = "both")]
    over: Over,

    /// Loopback port for the socket round trip (0 picks a free port)
    #[arg(short, long, default_value = "27015")]
    port: u16,

    /// Number of vertices
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u8).range(2..=26))]
    size: u8,
}

/// Transports exercised by the mesh command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Over {
    /// Archive file only
    File,
    /// Loopback socket only
    Tcp,
    /// File first, then socket
    Both,
}

#[derive(Args, Debug)]
struct TwoWayArgs {
    /// Loopback port (0 picks a free port)
    #[arg(short, long, default_value = "27015")]
    port: u16,

    /// Number of send/receive rounds
    #[arg(short, long, default_value = "5")]
    rounds: u32,

    /// Seed for the inserted values; random when omitted
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct AllTypesArgs {
    /// Archive file to write and read back
    #[arg(short, long, default_value = "alltypes.arc")]
    file: PathBuf,

    /// Seed for the collection contents; random when omitted
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    demo::register(TypeRegistry::global()).context("Failed to register demo types")?;
    debug!("Registered types: {:?}", TypeRegistry::global().tags());

    match &cli.command {
        Command::Tree(args) => run_tree(args),
        Command::Mesh(args) => run_mesh(args),
        Command::TwoWay(args) => run_two_way(args),
        Command::AllTypes(args) => run_all_types(args),
    }
}

/// Parse a byte given in decimal or as `0x`-prefixed hex
fn parse_mask(value: &str) -> std::result::Result<u8, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid mask `{value}`: {e}"))
}

/// Open `path` for writing, optionally behind an XOR mask
fn create_sink(path: &Path, mask: Option<u8>) -> Result<Box<dyn Transport>> {
    let file = FileTransport::create(path)
        .with_context(|| format!("Failed to create archive: {}", path.display()))?;
    Ok(match mask {
        Some(mask) => Box::new(XorFilter::new(file, mask)),
        None => Box::new(file),
    })
}

/// Open `path` for reading, optionally behind an XOR mask
fn open_source(path: &Path, mask: Option<u8>) -> Result<Box<dyn Transport>> {
    let file = FileTransport::open(path)
        .with_context(|| format!("Failed to open archive: {}", path.display()))?;
    Ok(match mask {
        Some(mask) => Box::new(XorFilter::new(file, mask)),
        None => Box::new(file),
    })
}

fn archive_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn run_tree(args: &TreeArgs) -> Result<()> {
    let mut tree = demo::sample_tree();
    let before = match &tree {
        Some(root) => draw(root, args.nulls),
        None => bail!("Sample tree is empty"),
    };
    println!("Tree out:\n{before}");

    {
        let mut sink = create_sink(&args.file, args.mask)?;
        let mut ar = Archive::with_mode(&mut *sink, Mode::Save);
        ar.serialize(&mut tree).context("Failed to save tree")?;
        ar.checkpoint()?;
        ar.flush()?;
    }
    info!(
        "Wrote {} bytes to {}",
        archive_size(&args.file),
        args.file.display()
    );

    let mut loaded: Option<demo::Link> = None;
    {
        let mut source = open_source(&args.file, args.mask)?;
        let mut ar = Archive::with_mode(&mut *source, Mode::Load);
        ar.serialize(&mut loaded)
            .with_context(|| format!("Failed to load tree from {}", args.file.display()))?;
        ar.checkpoint().context("Archive checksum does not match")?;
    }

    let after = match &loaded {
        Some(root) => draw(root, args.nulls),
        None => bail!("Loaded tree is empty"),
    };
    println!("Tree in:\n{after}");

    if before != after {
        bail!("Tree changed in transit");
    }
    Ok(())
}

fn run_mesh(args: &MeshArgs) -> Result<()> {
    if matches!(args.over, Over::File | Over::Both) {
        {
            let mut sink = create_sink(&args.file, None)?;
            save_mesh(&mut *sink, args.size)?;
        }
        let mut source = open_source(&args.file, None)?;
        let names = load_mesh(&mut *source)?;
        println!("File: {} peers intact ({})", names.len(), names.join(" "));
    }

    if matches!(args.over, Over::Tcp | Over::Both) {
        let listener = TcpListener::bind(("127.0.0.1", args.port))
            .with_context(|| format!("Failed to listen on port {}", args.port))?;
        let addr = listener.local_addr()?;
        let size = args.size;
        debug!("Mesh server listening on {}", addr);

        let server = thread::spawn(move || -> Result<()> {
            let mut transport = TcpTransport::accept(&listener)?;
            save_mesh(&mut transport, size)
        });
        let names = TcpTransport::connect(addr)
            .map_err(anyhow::Error::from)
            .and_then(|mut client| load_mesh(&mut client));
        server
            .join()
            .map_err(|_| anyhow!("Mesh server thread panicked"))??;
        let names = names?;
        println!("Socket: {} peers intact ({})", names.len(), names.join(" "));
    }
    Ok(())
}

/// Save the first vertex of a fresh mesh; the rest follows through links
fn save_mesh(transport: &mut dyn Transport, size: u8) -> Result<()> {
    let peers = demo::mesh(size);
    let mut root = peers.first().cloned();

    let mut ar = Archive::with_mode(transport, Mode::Save);
    let saved = ar
        .serialize(&mut root)
        .and_then(|()| ar.checkpoint())
        .and_then(|()| ar.flush());
    drop(ar);
    demo::unlink(&peers);

    saved.context("Failed to save mesh")?;
    info!("Saved a mesh of {} peers", size);
    Ok(())
}

/// Load a mesh and return the vertex names once every link checks out
fn load_mesh(transport: &mut dyn Transport) -> Result<Vec<String>> {
    let mut root: Option<Rc<RefCell<Peer>>> = None;
    {
        let mut ar = Archive::with_mode(transport, Mode::Load);
        ar.serialize(&mut root).context("Failed to load mesh")?;
        ar.checkpoint().context("Archive checksum does not match")?;
    }
    let root = root.context("Mesh arrived empty")?;

    let mut peers = vec![Rc::clone(&root)];
    peers.extend(root.borrow().links.iter().cloned());
    let complete = demo::is_complete(&peers);
    let names = peers.iter().map(|peer| peer.borrow().name.clone()).collect();
    demo::unlink(&peers);

    if !complete {
        bail!("Mesh lost links in transit");
    }
    Ok(names)
}

fn run_two_way(args: &TwoWayArgs) -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", args.port))
        .with_context(|| format!("Failed to listen on port {}", args.port))?;
    let addr = listener.local_addr()?;
    let seed = args.seed.unwrap_or_else(rand::random);
    let rounds = args.rounds;
    info!("Two-way exchange on {} with seed {}", addr, seed);

    let server = thread::spawn(move || two_way_server(listener, rounds, seed));
    let client = two_way_client(addr, rounds, seed.wrapping_add(1));
    let received = server
        .join()
        .map_err(|_| anyhow!("Two-way server thread panicked"))??;
    let sent = client?;

    if received != sent {
        bail!("Server received {:?} but client sent {:?}", received, sent);
    }
    println!("Two-way exchange: {} rounds, {} entries agree", rounds, sent.len());
    Ok(())
}

/// Send the tree, take it back, add an entry; returns the last tree received
fn two_way_server(listener: TcpListener, rounds: u32, seed: u64) -> Result<Vec<i32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut transport = TcpTransport::accept(&listener)?;
    let mut ar = Archive::new(&mut transport);

    let mut tree = Some(Entry::new("Root", 5));
    let mut received = Vec::new();
    for round in 0..rounds {
        debug!("Server round {}: sending", round);
        ar.save(&mut tree)?;
        ar.checkpoint()?;
        ar.flush()?;

        debug!("Server round {}: receiving", round);
        ar.load(&mut tree)?;
        ar.checkpoint()?;
        let root = tree.as_ref().context("Client sent an empty tree")?;
        received = root.borrow().values();
        root.borrow_mut()
            .insert(Entry::new("Server", rng.gen_range(0..=10)));
    }

    if let Some(root) = &tree {
        println!("Server:\n{}", draw(root, true));
    }
    Ok(received)
}

/// Take the tree, add an entry, send it back; returns the last tree sent
fn two_way_client(addr: SocketAddr, rounds: u32, seed: u64) -> Result<Vec<i32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut transport = TcpTransport::connect(addr)?;
    let mut ar = Archive::new(&mut transport);

    let mut tree: Option<Rc<RefCell<Entry>>> = None;
    let mut sent = Vec::new();
    for round in 0..rounds {
        debug!("Client round {}: receiving", round);
        ar.load(&mut tree)?;
        ar.checkpoint()?;
        let root = tree.as_ref().context("Server sent an empty tree")?;
        root.borrow_mut()
            .insert(Entry::new("Client", rng.gen_range(0..=10)));
        sent = root.borrow().values();

        debug!("Client round {}: sending", round);
        ar.save(&mut tree)?;
        ar.checkpoint()?;
        ar.flush()?;
    }
    Ok(sent)
}

fn run_all_types(args: &AllTypesArgs) -> Result<()> {
    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut source = demo::sample_types(&mut rng);
    let before = draw(&&source, true);
    println!("AllTypes tree out:\n{before}");

    {
        let mut sink = create_sink(&args.file, None)?;
        let mut ar = Archive::with_mode(&mut *sink, Mode::Save);
        ar.serialize(&mut source).context("Failed to save sample")?;
        ar.checkpoint()?;
        ar.flush()?;
    }
    info!(
        "Wrote {} bytes to {} (seed {})",
        archive_size(&args.file),
        args.file.display(),
        seed
    );

    let mut loaded = Sample::default();
    {
        let mut source = open_source(&args.file, None)?;
        let mut ar = Archive::with_mode(&mut *source, Mode::Load);
        ar.serialize(&mut loaded)
            .with_context(|| format!("Failed to load sample from {}", args.file.display()))?;
        ar.checkpoint().context("Archive checksum does not match")?;
    }
    println!("AllTypes tree in:\n{}", draw(&&loaded, true));

    if loaded != source {
        bail!("Sample changed in transit");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() {
        demo::register(TypeRegistry::global()).unwrap();
    }

    #[test]
    fn test_parse_mask() {
        assert_eq!(parse_mask("90"), Ok(90));
        assert_eq!(parse_mask("0x5a"), Ok(0x5A));
        assert_eq!(parse_mask("0XFF"), Ok(0xFF));
        assert!(parse_mask("256").is_err());
        assert!(parse_mask("0xg").is_err());
    }

    #[test]
    fn test_tree_roundtrip_with_mask() {
        setup();
        let temp_dir = TempDir::new().unwrap();
        let args = TreeArgs {
            file: temp_dir.path().join("tree.arc"),
            mask: Some(0x5A),
            nulls: true,
        };
        run_tree(&args).unwrap();
        assert!(archive_size(&args.file) > 0);

        // the masked file is unreadable without the mask
        let mut source = open_source(&args.file, None).unwrap();
        let mut ar = Archive::with_mode(&mut *source, Mode::Load);
        let mut tree: Option<demo::Link> = None;
        assert!(ar.serialize(&mut tree).is_err());
    }

    #[test]
    fn test_mesh_over_file_and_socket() {
        setup();
        let temp_dir = TempDir::new().unwrap();
        let args = MeshArgs {
            file: temp_dir.path().join("mesh.arc"),
            over: Over::Both,
            port: 0,
            size: 5,
        };
        run_mesh(&args).unwrap();
    }

    #[test]
    fn test_two_way_rounds() {
        setup();
        let args = TwoWayArgs {
            port: 0,
            rounds: 3,
            seed: Some(11),
        };
        run_two_way(&args).unwrap();
    }

    #[test]
    fn test_all_types_roundtrip() {
        setup();
        let temp_dir = TempDir::new().unwrap();
        let args = AllTypesArgs {
            file: temp_dir.path().join("alltypes.arc"),
            seed: Some(3),
        };
        run_all_types(&args).unwrap();
    }

    #[test]
    fn test_missing_archive_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let err = open_source(&temp_dir.path().join("absent.arc"), None)
            .err()
            .unwrap();
        assert!(err.to_string().contains("absent.arc"));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
