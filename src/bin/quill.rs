use clap::{App, Arg, SubCommand};
use quill::gen_seq;
use quill::mutation::{apply_mutations, lift_position};
use quill::refine::{consensus_qvs, refine_consensus};
use quill::{BandedMultiReadScorer, MappedRead, Read, RefineOptions, ScorerConfig, Snr, Strand};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use std::error::Error;
#[macro_use]
extern crate log;

type BoxResult<T> = std::result::Result<T, Box<dyn Error>>;

fn verbose() -> Arg<'static, 'static> {
    Arg::with_name("verbose")
        .short("v")
        .multiple(true)
        .help("Debug mode")
}

fn threads() -> Arg<'static, 'static> {
    Arg::with_name("threads")
        .long("threads")
        .short("t")
        .takes_value(true)
        .default_value("1")
        .help("Number of threads")
}

fn snr() -> Arg<'static, 'static> {
    Arg::with_name("snr")
        .long("snr")
        .takes_value(true)
        .default_value("10,7,5,11")
        .help("Signal-to-noise ratio of A,C,G,T channels.")
}

fn subcommand_score() -> App<'static, 'static> {
    SubCommand::with_name("score")
        .version("0.1")
        .author("Bansho Masutani")
        .about("Log-likelihood of reads given a template.")
        .arg(verbose())
        .arg(threads())
        .arg(snr())
        .arg(
            Arg::with_name("template")
                .long("template")
                .value_name("SEQ")
                .takes_value(true)
                .required(true)
                .help("Template sequence."),
        )
        .arg(
            Arg::with_name("read")
                .long("read")
                .value_name("SEQ")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .required(true)
                .help("Read sequence aligned to the whole template. Can be repeated."),
        )
}

fn subcommand_simulate() -> App<'static, 'static> {
    SubCommand::with_name("simulate")
        .version("0.1")
        .author("Bansho Masutani")
        .about("Polish a corrupted copy of a random template by simulated reads.")
        .arg(verbose())
        .arg(threads())
        .arg(snr())
        .arg(
            Arg::with_name("length")
                .long("length")
                .takes_value(true)
                .default_value("500")
                .help("Length of the template."),
        )
        .arg(
            Arg::with_name("coverage")
                .long("coverage")
                .takes_value(true)
                .default_value("20")
                .help("Number of reads."),
        )
        .arg(
            Arg::with_name("errors")
                .long("errors")
                .takes_value(true)
                .default_value("10")
                .help("Number of errors in the draft."),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .takes_value(true)
                .default_value("32389")
                .help("Seed"),
        )
}

fn parse<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str) -> BoxResult<T> {
    matches
        .value_of(name)
        .and_then(|e| e.parse().ok())
        .ok_or_else(|| format!("invalid --{}", name).into())
}

fn parse_config(matches: &clap::ArgMatches) -> BoxResult<ScorerConfig> {
    let snr: Vec<f64> = matches
        .value_of("snr")
        .unwrap_or_default()
        .split(',')
        .map(|x| x.parse::<f64>())
        .collect::<std::result::Result<_, _>>()?;
    match snr.as_slice() {
        &[a, c, g, t] => Ok(ScorerConfig::new(Snr::new(a, c, g, t))),
        _ => Err("--snr should be four comma-separated values".into()),
    }
}

fn score(matches: &clap::ArgMatches) -> BoxResult<()> {
    let config = parse_config(matches)?;
    let template = matches.value_of("template").unwrap_or_default().as_bytes();
    let mut mms = BandedMultiReadScorer::new(config, template)?;
    for (i, seq) in matches.values_of("read").into_iter().flatten().enumerate() {
        let read = Read::new(format!("read{}", i), seq.as_bytes())?;
        let read = MappedRead::new(read, Strand::Forward, 0, template.len());
        let outcome = mms.add_read_default(read)?;
        debug!("ADD\t{}\t{:?}", i, outcome);
    }
    for (i, score) in mms.baseline_scores().iter().enumerate() {
        match score {
            Some(score) => println!("{}\t{:.4}", mms.read(i).read.name, score),
            None => println!("{}\tNA", mms.read(i).read.name),
        }
    }
    println!("total\t{:.4}", mms.baseline_score());
    Ok(())
}

fn simulate(matches: &clap::ArgMatches) -> BoxResult<()> {
    let config = parse_config(matches)?;
    let length: usize = parse(matches, "length")?;
    let coverage: usize = parse(matches, "coverage")?;
    let errors: usize = parse(matches, "errors")?;
    let seed: u64 = parse(matches, "seed")?;
    let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(seed);
    let template = gen_seq::generate_seq(&mut rng, length);
    let reads = gen_seq::simulate_reads(&template, &mut rng, coverage, &gen_seq::CCS_PROFILE);
    let mutations = gen_seq::random_mutations(&template, &mut rng, errors);
    let draft = apply_mutations(&mutations, &template);
    let mut mms = BandedMultiReadScorer::new(config, &draft)?;
    for mut read in reads {
        read.template_start = lift_position(&mutations, read.template_start, false);
        read.template_end = lift_position(&mutations, read.template_end, true);
        mms.add_read_default(read)?;
    }
    let start = std::time::Instant::now();
    let converged = refine_consensus(&mut mms, &RefineOptions::default())?;
    let polished = mms.template(Strand::Forward).seq().to_vec();
    let qvs = consensus_qvs(&mut mms)?;
    let mean_qv = qvs.iter().map(|&q| q as f64).sum::<f64>() / qvs.len().max(1) as f64;
    info!("ELAPSED\t{}ms", start.elapsed().as_millis());
    println!("converged\t{}", converged);
    println!("before\t{}", gen_seq::edit_dist(&draft, &template));
    println!("after\t{}", gen_seq::edit_dist(&polished, &template));
    println!("mean_qv\t{:.2}", mean_qv);
    Ok(())
}

fn main() -> BoxResult<()> {
    let matches = App::new("quill")
        .version("0.1")
        .author("Bansho Masutani")
        .about("Scoring reads against templates with context-dependent pair-HMMs.")
        .setting(clap::AppSettings::ArgRequiredElseHelp)
        .subcommand(subcommand_score())
        .subcommand(subcommand_simulate())
        .get_matches();
    if let Some(sub_m) = matches.subcommand().1 {
        let level = match sub_m.occurrences_of("verbose") {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
        let threads: usize = parse(sub_m, "threads")?;
        if let Err(why) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            debug!("{:?} The global pool has already been built.", why);
        }
    }
    debug!("Start");
    match matches.subcommand() {
        ("score", Some(sub_m)) => score(sub_m),
        ("simulate", Some(sub_m)) => simulate(sub_m),
        _ => unreachable!(),
    }
}
