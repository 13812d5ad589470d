//! Train a TCN segmentation network
//!
//! Parameters come from an optional JSON params file; command line flags
//! override individual values.

use std::path::PathBuf;

use anyhow::{bail, Result};
use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use clap::Parser;

use tcn_segmenter::model::{model_names, Activation, Padding};
use tcn_segmenter::utils::log_filter;
use tcn_segmenter::{setup_logging, train, TrainParams};

type Backend = Autodiff<NdArray<f32>>;

#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train a TCN for event segmentation of time-series recordings")]
struct Args {
    /// Dataset directory (npy layout with attrs.json)
    data_dir: Option<PathBuf>,

    /// JSON file with training parameters
    #[arg(long)]
    params_file: Option<PathBuf>,

    /// Suffix of the input files (x{suffix}.npy)
    #[arg(long)]
    x_suffix: Option<String>,

    /// Suffix of the target files (y{suffix}.npy)
    #[arg(long)]
    y_suffix: Option<String>,

    /// Directory for all outputs
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Prepended to the timestamp of output files
    #[arg(long)]
    save_prefix: Option<String>,

    /// Architecture (tcn, tcn_stft, tcn_tcn)
    #[arg(long)]
    model_name: Option<String>,

    #[arg(long)]
    nb_filters: Option<usize>,

    /// Kernel duration in samples
    #[arg(long)]
    kernel_size: Option<usize>,

    /// Number of TCN stacks
    #[arg(long)]
    nb_conv: Option<usize>,

    /// Comma-separated dilation rates, e.g. 1,2,4,8,16
    #[arg(long, value_delimiter = ',')]
    dilations: Option<Vec<usize>>,

    /// Comma-separated flags per stack, e.g. true,false,false
    #[arg(long, value_delimiter = ',')]
    use_separable: Option<Vec<bool>>,

    #[arg(long, value_enum)]
    activation: Option<Activation>,

    #[arg(long, value_enum)]
    padding: Option<Padding>,

    #[arg(long)]
    use_skip_connections: Option<bool>,

    #[arg(long)]
    dropout_rate: Option<f64>,

    /// Chunk length in samples
    #[arg(long)]
    nb_hist: Option<usize>,

    /// Discard predictions at chunk edges
    #[arg(long)]
    ignore_boundaries: Option<bool>,

    /// Downsampling exponent of the frontend (0 disables it)
    #[arg(long)]
    nb_pre_conv: Option<usize>,

    #[arg(long)]
    pre_nb_dft: Option<usize>,

    #[arg(long)]
    pre_kernel_size: Option<usize>,

    #[arg(long)]
    pre_nb_filters: Option<usize>,

    #[arg(long)]
    pre_nb_conv: Option<usize>,

    #[arg(long)]
    nb_lstm_units: Option<usize>,

    #[arg(long)]
    upsample: Option<bool>,

    /// Label every sample of a chunk (false: classify the chunk centre)
    #[arg(long)]
    with_y_hist: Option<bool>,

    /// 0 silent, 1 progress bar, 2 one line per epoch
    #[arg(long)]
    verbose: Option<u8>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    nb_epoch: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    reduce_lr: Option<bool>,

    #[arg(long)]
    reduce_lr_patience: Option<usize>,

    /// Fraction of the data to use, or seconds of training data when > 1
    #[arg(long)]
    fraction_data: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    batch_level_subsampling: Option<bool>,

    /// Weight the loss by inverse class frequency
    #[arg(long)]
    balance: Option<bool>,

    /// Record a hash of the dataset
    #[arg(long)]
    version_data: Option<bool>,

    /// Write per-epoch metrics to SAVE_NAME_metrics.csv
    #[arg(long)]
    metrics_log: Option<bool>,

    /// Experiment tracking endpoint
    #[arg(long)]
    tracking_url: Option<String>,

    #[arg(long, env = "TRACKING_TOKEN", hide_env_values = true)]
    tracking_token: Option<String>,

    #[arg(long)]
    tracking_project: Option<String>,

    /// Log at info level
    #[arg(long)]
    log_messages: Option<bool>,
}

macro_rules! override_fields {
    ($params:ident, $args:ident; $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $args.$field {
                $params.$field = value;
            }
        )+
    };
}

impl Args {
    fn into_params(self) -> Result<TrainParams> {
        let args = self;
        let mut params = match &args.params_file {
            Some(path) => TrainParams::from_json_file(path)?,
            None => TrainParams::default(),
        };

        override_fields!(params, args;
            data_dir, x_suffix, y_suffix, save_dir, model_name, nb_filters, kernel_size,
            nb_conv, dilations, use_separable, activation, padding, use_skip_connections,
            dropout_rate, nb_hist, ignore_boundaries, nb_pre_conv, pre_nb_dft, pre_kernel_size,
            pre_nb_filters, pre_nb_conv, nb_lstm_units, upsample, with_y_hist, verbose,
            batch_size, nb_epoch, reduce_lr, reduce_lr_patience, batch_level_subsampling,
            balance, version_data, metrics_log, log_messages,
        );

        if args.save_prefix.is_some() {
            params.save_prefix = args.save_prefix;
        }
        if args.learning_rate.is_some() {
            params.learning_rate = args.learning_rate;
        }
        if args.fraction_data.is_some() {
            params.fraction_data = args.fraction_data;
        }
        if args.seed.is_some() {
            params.seed = args.seed;
        }
        if args.tracking_url.is_some() {
            params.tracking_url = args.tracking_url;
        }
        if args.tracking_token.is_some() {
            params.tracking_token = args.tracking_token;
        }
        if args.tracking_project.is_some() {
            params.tracking_project = args.tracking_project;
        }

        if params.data_dir.as_os_str().is_empty() {
            bail!("No dataset given: pass DATA_DIR or set data_dir in --params-file");
        }
        Ok(params)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let params = args.into_params()?;

    setup_logging(&log_filter(params.log_messages));

    println!("\nTCN Training");
    println!("═══════════════════════════════════════════════════════════════\n");
    println!("[DATA] {}", params.data_dir.display());
    println!(
        "[MODEL] {} (available: {})",
        params.model_name,
        model_names().join(", ")
    );
    println!(
        "[MODEL] nb_hist={} kernel_size={} nb_conv={} dilations={:?} nb_filters={}",
        params.nb_hist, params.kernel_size, params.nb_conv, params.dilations, params.nb_filters
    );
    println!(
        "[TRAINING] epochs={} batch_size={} learning_rate={}",
        params.nb_epoch,
        params.batch_size,
        params
            .learning_rate
            .map(|lr| lr.to_string())
            .unwrap_or_else(|| "model default".to_string())
    );
    println!();

    let device = Default::default();
    let outcome = train::<Backend>(&params, Vec::new(), &device)?;

    println!("═══════════════════════════════════════════════════════════════");
    println!("[OUTPUT] {}", outcome.save_name.display());
    println!("[OUTPUT] {} epochs trained", outcome.history.len());
    if let Some(best) = outcome.history.best() {
        println!(
            "[OUTPUT] best epoch {} with val_loss {:.5}",
            best.epoch + 1,
            best.monitored()
        );
    }
    match &outcome.results {
        Some(results) => {
            println!("\nConfusion matrix:\n{}", results.confusion_matrix);
            println!("{}", results.report);
        }
        None => println!("[OUTPUT] no test data, evaluation skipped"),
    }

    Ok(())
}
