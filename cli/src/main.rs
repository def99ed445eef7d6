//! gltfpack command line driver.
//!
//! Parses arguments, loads the input scene, runs the packing pipeline,
//! and writes the output artifacts. Exit codes: 0 success, 1 usage
//! error, 2 input load error, 3 missing external transcoder, 4 output
//! write error.

use std::io::Write as _;
use std::path::Path;
use std::process::ExitCode;

use gltfpack_core::image::{BasisEncoder, TextureEncoder};
use gltfpack_core::import::import_scene;
use gltfpack_core::pack::frame_glb;
use gltfpack_core::pipeline::pack_scene;
use gltfpack_core::write::BufferUris;
use gltfpack_core::{Error, Settings};

fn init_logging(verbose: u32) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| match record.level() {
            log::Level::Error => writeln!(buf, "Error: {}", record.args()),
            log::Level::Warn => writeln!(buf, "Warning: {}", record.args()),
            _ => writeln!(buf, "{}", record.args()),
        })
        .init();
}

fn print_usage(help: bool) {
    eprintln!("gltfpack {}", gltfpack_core::VERSION);
    eprintln!("Usage: gltfpack [options] -i input -o output");

    if help {
        eprintln!();
        eprintln!("Basics:");
        eprintln!("\t-i file: input file to process, .obj/.gltf/.glb");
        eprintln!("\t-o file: output file path, .gltf/.glb");
        eprintln!("\t-c: produce compressed gltf/glb files (-cc for higher compression ratio)");
        eprintln!("Textures:");
        eprintln!("\t-te: embed all textures into main buffer (.bin or .glb)");
        eprintln!("\t-tb: convert all textures to Basis Universal format (with basisu executable)");
        eprintln!("\t-tc: convert all textures to KTX2 with BasisU supercompression (using basisu executable)");
        eprintln!("\t-tq N: set texture encoding quality (default: 50; N should be between 1 and 100)");
        eprintln!("\t-tu: use UASTC when encoding textures (much higher quality and much larger size)");
        eprintln!("Simplification:");
        eprintln!("\t-si R: simplify meshes to achieve the ratio R (default: 1; R should be between 0 and 1)");
        eprintln!("\t-sa: aggressively simplify to the target ratio disregarding quality");
        eprintln!("Vertices:");
        eprintln!("\t-vp N: use N-bit quantization for positions (default: 14; N should be between 1 and 16)");
        eprintln!("\t-vt N: use N-bit quantization for texture coordinates (default: 12; N should be between 1 and 16)");
        eprintln!("\t-vn N: use N-bit quantization for normals and tangents (default: 8; N should be between 1 and 16)");
        eprintln!("Animations:");
        eprintln!("\t-at N: use N-bit quantization for translations (default: 16; N should be between 1 and 24)");
        eprintln!("\t-ar N: use N-bit quantization for rotations (default: 12; N should be between 4 and 16)");
        eprintln!("\t-as N: use N-bit quantization for scale (default: 16; N should be between 1 and 24)");
        eprintln!("\t-af N: resample animations at N Hz (default: 30)");
        eprintln!("\t-ac: keep constant animation tracks even if they don't modify the node transform");
        eprintln!("Scene:");
        eprintln!("\t-kn: keep named nodes and meshes attached to named nodes so that named nodes can be transformed externally");
        eprintln!("\t-ke: keep extras data");
        eprintln!("Miscellaneous:");
        eprintln!("\t-cf: produce compressed gltf/glb files with fallback for loaders that don't support compression");
        eprintln!("\t-noq: disable quantization; produces much larger glTF files with no extensions");
        eprintln!("\t-test file ...: process files in test mode without writing output");
        eprintln!("\t-v: verbose output (print version when used without other options)");
        eprintln!("\t-h: display this help and exit");
    } else {
        eprintln!();
        eprintln!("Basics:");
        eprintln!("\t-i file: input file to process, .obj/.gltf/.glb");
        eprintln!("\t-o file: output file path, .gltf/.glb");
        eprintln!("\t-c: produce compressed gltf/glb files (-cc for higher compression ratio)");
        eprintln!("\t-te: embed all textures into main buffer (.bin or .glb)");
        eprintln!("\t-tc: convert all textures to KTX2 with BasisU supercompression (using basisu executable)");
        eprintln!("\t-si R: simplify meshes to achieve the ratio R (default: 1; R should be between 0 and 1)");
        eprintln!();
        eprintln!("Run gltfpack -h to display a full list of options");
    }
}

struct Args {
    settings: Settings,
    input: Option<String>,
    output: Option<String>,
    help: bool,
    test: bool,
    test_inputs: Vec<String>,
    argc: usize,
}

fn parse_args() -> Result<Args, String> {
    let argv: Vec<String> = std::env::args().collect();
    let mut args = Args {
        settings: Settings::default(),
        input: None,
        output: None,
        help: false,
        test: false,
        test_inputs: Vec::new(),
        argc: argv.len(),
    };

    let numeric = |argv: &[String], i: usize| -> bool {
        i + 1 < argv.len() && argv[i + 1].starts_with(|c: char| c.is_ascii_digit())
    };

    let mut i = 1;
    while i < argv.len() {
        let arg = argv[i].as_str();
        let settings = &mut args.settings;

        match arg {
            "-vp" if numeric(&argv, i) => {
                i += 1;
                settings.pos_bits = argv[i].parse().unwrap_or(14).clamp(1, 16);
            }
            "-vt" if numeric(&argv, i) => {
                i += 1;
                settings.tex_bits = argv[i].parse().unwrap_or(12).clamp(1, 16);
            }
            "-vn" if numeric(&argv, i) => {
                i += 1;
                settings.nrm_bits = argv[i].parse().unwrap_or(8).clamp(1, 16);
            }
            "-at" if numeric(&argv, i) => {
                i += 1;
                settings.trn_bits = argv[i].parse().unwrap_or(16).clamp(1, 24);
            }
            "-ar" if numeric(&argv, i) => {
                i += 1;
                settings.rot_bits = argv[i].parse().unwrap_or(12).clamp(4, 16);
            }
            "-as" if numeric(&argv, i) => {
                i += 1;
                settings.scl_bits = argv[i].parse().unwrap_or(16).clamp(1, 24);
            }
            "-af" if numeric(&argv, i) => {
                i += 1;
                settings.anim_freq = argv[i].parse().unwrap_or(30).max(1);
            }
            "-ac" => settings.anim_const = true,
            "-kn" => settings.keep_named = true,
            "-ke" => settings.keep_extras = true,
            "-si" if numeric(&argv, i) => {
                i += 1;
                settings.simplify_threshold = argv[i].parse().unwrap_or(1.0_f32).clamp(0.0, 1.0);
            }
            "-sa" => settings.simplify_aggressive = true,
            "-te" => settings.texture_embed = true,
            "-tb" => settings.texture_basis = true,
            "-tu" => {
                settings.texture_basis = true;
                settings.texture_uastc = true;
            }
            "-tc" => {
                settings.texture_basis = true;
                settings.texture_ktx2 = true;
            }
            "-tq" if numeric(&argv, i) => {
                i += 1;
                settings.texture_quality = argv[i].parse().unwrap_or(50).clamp(1, 100);
            }
            "-noq" => settings.quantize = false,
            "-i" if i + 1 < argv.len() && args.input.is_none() => {
                i += 1;
                args.input = Some(argv[i].clone());
            }
            "-o" if i + 1 < argv.len() && args.output.is_none() => {
                i += 1;
                args.output = Some(argv[i].clone());
            }
            "-c" => settings.compress = true,
            "-cc" => {
                settings.compress = true;
                settings.compressmore = true;
            }
            "-cf" => {
                settings.compress = true;
                settings.fallback = true;
            }
            "-v" => settings.verbose = 1,
            "-vv" => settings.verbose = 2,
            "-h" => args.help = true,
            "-test" => args.test = true,
            other if other.starts_with('-') => {
                return Err(format!("Unrecognized option {other}"));
            }
            other if args.test => args.test_inputs.push(other.to_string()),
            other => {
                return Err(format!("Expected option, got {other} instead"));
            }
        }

        i += 1;
    }

    Ok(args)
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn save(path: &Path, data: &[u8]) -> bool {
    if let Err(e) = std::fs::write(path, data) {
        log::error!("saving {}: {e}", path.display());
        return false;
    }
    true
}

fn run(input: &str, output: Option<&str>, settings: &Settings) -> u8 {
    let mut scene = match import_scene(Path::new(input)) {
        Ok(scene) => scene,
        Err(e) => {
            log::error!("loading {input}: {e}");
            return 2;
        }
    };

    let encoder = BasisEncoder;
    if settings.texture_basis && !scene.images.is_empty() && !encoder.check() {
        log::error!("basisu is not present in PATH or BASISU_PATH is not set");
        return 3;
    }

    enum Form {
        Discard,
        Gltf,
        Glb,
    }

    let out_path = output.map(Path::new);
    let form = match out_path {
        None => Form::Discard,
        Some(path) => match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("gltf") => Form::Gltf,
            Some("glb") => Form::Glb,
            _ => {
                log::error!(
                    "saving {}: unknown extension (expected .gltf or .glb)",
                    output.unwrap_or_default()
                );
                return 4;
            }
        },
    };

    let bin_path = out_path.map(|p| p.with_extension("bin"));
    let fallback_path = out_path.map(|p| p.with_extension("fallback.bin"));

    let bin_uri = bin_path.as_deref().map(base_name);
    let fallback_uri = fallback_path.as_deref().map(base_name);

    let uris = match &form {
        Form::Discard => BufferUris::default(),
        Form::Gltf => BufferUris {
            bin: bin_uri.as_deref(),
            fallback: if settings.fallback {
                fallback_uri.as_deref()
            } else {
                None
            },
        },
        Form::Glb => BufferUris {
            bin: None,
            fallback: if settings.fallback {
                fallback_uri.as_deref()
            } else {
                None
            },
        },
    };

    let result = match pack_scene(&mut scene, settings, &encoder, &uris) {
        Ok(result) => result,
        Err(e @ (Error::ExternalToolMissing | Error::ExternalToolFailed(_))) => {
            log::error!("{e}");
            return 3;
        }
        Err(e) => {
            log::error!("{e}");
            return 4;
        }
    };

    match form {
        Form::Discard => 0,
        Form::Gltf => {
            let path = out_path.unwrap_or(Path::new(""));
            let ok = save(path, &result.json)
                && save(bin_path.as_deref().unwrap_or(Path::new("")), &result.bin)
                && (!settings.fallback
                    || save(
                        fallback_path.as_deref().unwrap_or(Path::new("")),
                        &result.fallback,
                    ));
            if ok {
                0
            } else {
                4
            }
        }
        Form::Glb => {
            let glb = frame_glb(&result.json, &result.bin);
            let path = out_path.unwrap_or(Path::new(""));
            let ok = save(path, &glb)
                && (!settings.fallback
                    || save(
                        fallback_path.as_deref().unwrap_or(Path::new("")),
                        &result.fallback,
                    ));
            if ok {
                0
            } else {
                4
            }
        }
    }
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(1);
        }
    };

    init_logging(args.settings.verbose);

    // Shortcut: `gltfpack -v` prints the version.
    if args.settings.verbose > 0 && args.argc == 2 {
        println!("gltfpack {}", gltfpack_core::VERSION);
        return ExitCode::SUCCESS;
    }

    if args.test {
        for path in &args.test_inputs {
            println!("{path}");
            run(path, None, &args.settings);
        }
        return ExitCode::SUCCESS;
    }

    let (Some(input), Some(output)) = (&args.input, &args.output) else {
        print_usage(args.help);
        return ExitCode::from(1);
    };
    if args.help {
        print_usage(true);
        return ExitCode::from(1);
    }

    ExitCode::from(run(input, Some(output.as_str()), &args.settings))
}
