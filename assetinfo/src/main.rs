use anyhow::Context;
use asset::{Handle, Settings};
use log::info;
use structopt::StructOpt;

#[derive(Debug, Copy, Clone)]
enum Kind {
    Raw,
    Audio,
    Voxel,
}

#[derive(StructOpt, Debug)]
#[structopt(name = "assetinfo")]
struct Opt {
    /// Path of the asset. With `--bootstrap` the name is relative to the
    /// configured asset root.
    #[structopt(short, long)]
    input: String,

    #[structopt(short, long, default_value = "raw", parse(try_from_str = parse_kind))]
    kind: Kind,

    /// Load settings and open the asset through the configured file system.
    #[structopt(short, long)]
    bootstrap: bool,
}

fn parse_kind(src: &str) -> Result<Kind, &'static str> {
    match src.to_lowercase().as_str() {
        "raw" => Ok(Kind::Raw),
        "audio" => Ok(Kind::Audio),
        "voxel" => Ok(Kind::Voxel),
        _ => Err("unknown kind, expected raw, audio or voxel"),
    }
}

fn main() {
    env_logger::init();

    let opt = Opt::from_args();

    if let Err(e) = run(&opt) {
        eprintln!("error: {:?}", e);
        std::process::exit(1);
    }
}

fn run(opt: &Opt) -> anyhow::Result<()> {
    let handle = open(opt)?;

    println!("filename={}", handle.filename());
    println!("size={}", handle.size());

    match opt.kind {
        Kind::Raw => handle_raw(&handle),
        Kind::Audio => handle_audio(&handle)?,
        Kind::Voxel => handle_voxel(&handle)?,
    }

    Ok(())
}

fn open(opt: &Opt) -> anyhow::Result<Handle> {
    if !opt.bootstrap {
        return Ok(asset::load(&opt.input)?);
    }

    let settings = Settings::load()?;
    info!("Using asset root {:?}", settings.root);

    let fs = asset::bootstrap(&settings).context("bootstrap failed")?;
    Ok(fs.open(&opt.input)?)
}

fn handle_raw(handle: &Handle) {
    let head = &handle.bytes()[..handle.size().min(16)];
    let hex = head
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ");

    println!("head={}", hex);
}

fn handle_audio(handle: &Handle) -> anyhow::Result<()> {
    let audio = audio::decode(handle)?;
    let spec = audio.spec();

    println!("audio");
    println!(
        "channels={}",
        spec.channels
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",")
    );
    println!("frequency={}", spec.frequency);
    println!("duration_samples={}", audio.duration_samples());
    println!("duration_seconds={:.3}", audio.duration_seconds());
    Ok(())
}

fn handle_voxel(handle: &Handle) -> anyhow::Result<()> {
    let collection = voxel::decode(handle)?;

    println!("voxel");
    let mut models = collection.iter().collect::<Vec<_>>();
    models.sort_by_key(|(name, _)| *name);

    for (name, model) in models {
        let opaque = model.data.chunks_exact(4).filter(|v| v[3] > 0).count();
        println!("model name={} size={} opaque={}", name, model.size, opaque);
    }
    Ok(())
}
