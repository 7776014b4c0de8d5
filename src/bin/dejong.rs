extern crate clap;
extern crate dejong;
extern crate num_cpus;
extern crate tracing_subscriber;

use clap::{App, Arg, ArgMatches};
use dejong::timing::RollingAverage;
use dejong::{
    ChannelDepth, EngineConfig, EngineError, FramePacer, FrameController, Knob, ShapeParameters,
    SpanTimer, SystemClock, Timers, Tunables,
};
use std::str::FromStr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn parse_list<T: FromStr>(s: &str, separator: char, count: usize) -> Option<Vec<T>> {
    let values: Vec<T> = s
        .split(separator)
        .map(|v| T::from_str(v.trim()).ok())
        .collect::<Option<Vec<T>>>()?;
    if values.len() == count {
        Some(values)
    } else {
        None
    }
}

fn parse_shape(s: &str) -> Option<ShapeParameters> {
    parse_list::<f64>(s, ',', 4).map(|v| ShapeParameters::new(v[0], v[1], v[2], v[3]))
}

fn validate_range<T: FromStr + PartialOrd>(
    s: &str,
    low: T,
    high: T,
    isnotanumber_err: &str,
    isnotinrange_err: &str,
) -> Result<(), String> {
    match T::from_str(s) {
        Ok(i) => {
            if i >= low && i <= high {
                Ok(())
            } else {
                Err(isnotinrange_err.to_string())
            }
        }
        Err(_) => Err(isnotanumber_err.to_string()),
    }
}

const SIZE: &str = "size";
const THREADS: &str = "threads";
const FRAMES: &str = "frames";
const FADE: &str = "fade";
const BRIGHTNESS: &str = "brightness";
const STEPS_FACTOR: &str = "steps-factor";
const DEPTH: &str = "depth";
const SHAPE: &str = "shape";
const SEED: &str = "seed";
const PRECISE: &str = "precise";
const SCALAR_FADE: &str = "scalar-fade";
const PAUSED: &str = "paused";
const PACED: &str = "paced";

fn args<'a>() -> ArgMatches<'a> {
    let max_threads = num_cpus::get();

    App::new("dejong")
        .version("0.1.0")
        .author("Elf M. Sternberg <elf.sternberg@gmail.com>")
        .about("Headless Peter de Jong attractor renderer")
        .arg(
            Arg::with_name(SIZE)
                .long(SIZE)
                .short("s")
                .takes_value(true)
                .default_value("720")
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        8192,
                        "Could not parse texture size",
                        "Texture size must be between 1 and 8192",
                    )
                })
                .help("Cells per side of the accumulation texture"),
        )
        .arg(
            Arg::with_name(THREADS)
                .long(THREADS)
                .short("t")
                .takes_value(true)
                .validator(move |s| {
                    validate_range(
                        &s,
                        1,
                        max_threads,
                        "Could not parse thread count",
                        &format!("Thread count must be between 1 and {}", max_threads),
                    )
                })
                .help("Number of attractor workers [default: one per CPU]"),
        )
        .arg(
            Arg::with_name(FRAMES)
                .long(FRAMES)
                .short("n")
                .takes_value(true)
                .default_value("120")
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        1_000_000,
                        "Could not parse frame count",
                        "Frame count must be between 1 and 1000000",
                    )
                })
                .help("Frames to render"),
        )
        .arg(
            Arg::with_name(FADE)
                .long(FADE)
                .short("f")
                .takes_value(true)
                .default_value("0.95")
                .validator(|s| {
                    validate_range(
                        &s,
                        0.0,
                        1.0,
                        "Could not parse fade factor",
                        "Fade factor must be between 0 and 1",
                    )
                })
                .help("Per-frame decay of the texture"),
        )
        .arg(
            Arg::with_name(BRIGHTNESS)
                .long(BRIGHTNESS)
                .short("b")
                .takes_value(true)
                .default_value("1.0")
                .validator(|s| {
                    validate_range(
                        &s,
                        0.0,
                        10.0,
                        "Could not parse brightness",
                        "Brightness must be between 0 and 10",
                    )
                })
                .help("Light added per plotted point"),
        )
        .arg(
            Arg::with_name(STEPS_FACTOR)
                .long(STEPS_FACTOR)
                .short("k")
                .takes_value(true)
                .default_value("1.0")
                .validator(|s| {
                    validate_range(
                        &s,
                        0.0,
                        3.0,
                        "Could not parse steps factor",
                        "Steps factor must be between 0 and 3",
                    )
                })
                .help("Multiplier on the points plotted per frame"),
        )
        .arg(
            Arg::with_name(DEPTH)
                .long(DEPTH)
                .short("d")
                .takes_value(true)
                .possible_values(&["8", "16"])
                .default_value("16")
                .help("Bits per colour channel"),
        )
        .arg(
            Arg::with_name(SHAPE)
                .long(SHAPE)
                .short("p")
                .takes_value(true)
                .validator(|s| match parse_shape(&s) {
                    Some(_) => Ok(()),
                    None => Err("Shape must be four numbers: a,b,c,d".to_string()),
                })
                .help("Pin the coefficients instead of animating them, e.g. 1.4,-2.3,2.4,-2.1"),
        )
        .arg(
            Arg::with_name(SEED)
                .long(SEED)
                .takes_value(true)
                .validator(|s| match u64::from_str(&s) {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Could not parse seed".to_string()),
                })
                .help("Seed for trajectory starting points"),
        )
        .arg(
            Arg::with_name(PRECISE)
                .long(PRECISE)
                .help("Evaluate with double-precision sin and cos"),
        )
        .arg(
            Arg::with_name(SCALAR_FADE)
                .long(SCALAR_FADE)
                .help("Fade with a floating-point multiply per channel"),
        )
        .arg(
            Arg::with_name(PAUSED)
                .long(PAUSED)
                .help("Freeze the time accumulator"),
        )
        .arg(
            Arg::with_name(PACED)
                .long(PACED)
                .help("Pace frames at 60 Hz on the wall clock"),
        )
        .get_matches()
}

fn value<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<T, EngineError> {
    let raw = matches.value_of(name).unwrap_or("");
    T::from_str(raw).map_err(|_| EngineError::InvalidArgument(format!("{}: '{}'", name, raw)))
}

fn configure(matches: &ArgMatches) -> Result<(EngineConfig, Tunables), EngineError> {
    let config = EngineConfig {
        texture_size: value(matches, SIZE)?,
        threads: match matches.value_of(THREADS) {
            Some(_) => value(matches, THREADS)?,
            None => num_cpus::get(),
        },
        depth: match matches.value_of(DEPTH) {
            Some("8") => ChannelDepth::Eight,
            _ => ChannelDepth::Sixteen,
        },
        seed: match matches.value_of(SEED) {
            Some(_) => Some(value(matches, SEED)?),
            None => None,
        },
        ..EngineConfig::default()
    };

    let mut tunables = Tunables::default();
    tunables.set(Knob::FadeFactor, value(matches, FADE)?);
    tunables.set(Knob::Brightness, value(matches, BRIGHTNESS)?);
    tunables.set(Knob::StepFactor, value(matches, STEPS_FACTOR)?);
    tunables.set_flag(Knob::VectorSine, !matches.is_present(PRECISE));
    tunables.set_flag(Knob::VectorFade, !matches.is_present(SCALAR_FADE));
    tunables.set_flag(Knob::TimeFromDt, !matches.is_present(PAUSED));
    if let Some(shape) = matches.value_of(SHAPE).and_then(parse_shape) {
        for knob in [Knob::AFromT, Knob::BFromT, Knob::CFromT, Knob::DFromT].iter() {
            tunables.set_flag(*knob, false);
        }
        tunables.set_shape(&shape);
    }
    Ok((config, tunables))
}

fn run(matches: &ArgMatches) -> Result<(), EngineError> {
    let (config, tunables) = configure(matches)?;
    let frames: usize = value(matches, FRAMES)?;
    let mut controller = FrameController::new(config, tunables)?;
    // Start somewhere random along the animation, as an interactive
    // session would.
    controller.randomize(Knob::T);

    let mut timers = Timers::with_spans(&["fade", "attr"]);
    let mut frame_times = RollingAverage::new(60);
    let mut pacer = if matches.is_present(PACED) {
        Some(FramePacer::at_rate(SystemClock::new(), 60))
    } else {
        None
    };

    let mut last = None;
    for _ in 0..frames {
        let dt = match pacer.as_mut() {
            Some(pacer) => pacer.wait(),
            None => Duration::from_secs(1) / 60,
        };
        frame_times.add(dt.as_secs_f64() * 1000.0);
        last = Some(controller.render(dt, &mut timers));
    }

    let shape = controller.shape();
    println!("frames: {}", frames);
    println!(
        "texture: {}x{}, steps: {}, threads: {}",
        controller.config().texture_size,
        controller.config().texture_size,
        controller.steps(),
        controller.threads()
    );
    println!("t: {:.4}", controller.time());
    println!(
        "a: {:.3}, b: {:.3}, c: {:.3}, d: {:.3}",
        shape.a, shape.b, shape.c, shape.d
    );
    if let Some(stats) = last {
        println!("over: {}, speed: {:.2}", stats.over_total, stats.speed);
    }
    println!("lit cells: {}", controller.buffer().lit_cells());
    println!("frame time: {:.2} ms avg", frame_times.get());
    print!("{}", timers.report(false));
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = args();
    if let Err(e) = run(&matches) {
        eprintln!("Render failure: {}", e);
        std::process::exit(1);
    }
}
