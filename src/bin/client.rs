use argh::FromArgs;
use crop_doctor::{REPORT_FILE_NAME, client::DoctorClient, server::messages::StatusResponse};
use std::{path::PathBuf, time::Duration};

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3000;
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(FromArgs)]
/// Crop Doctor client for uploading photos and fetching diagnoses
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Upload(UploadCommand),
    Analyze(AnalyzeCommand),
    Status(StatusCommand),
    Download(DownloadCommand),
    Diagnose(DiagnoseCommand),
}

#[derive(FromArgs)]
/// Upload a plant photo
#[argh(subcommand, name = "upload")]
struct UploadCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,
}

#[derive(FromArgs)]
/// Launch the analysis of the uploaded photo
#[argh(subcommand, name = "analyze")]
struct AnalyzeCommand {}

#[derive(FromArgs)]
/// Show the current session state
#[argh(subcommand, name = "status")]
struct StatusCommand {}

#[derive(FromArgs)]
/// Save the diagnosis report
#[argh(subcommand, name = "download")]
struct DownloadCommand {
    /// where to write the report
    #[argh(option, short = 'o', default = "PathBuf::from(REPORT_FILE_NAME)")]
    output: PathBuf,
}

#[derive(FromArgs)]
/// Upload a photo, analyze it and print the report
#[argh(subcommand, name = "diagnose")]
struct DiagnoseCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,
}

fn print_status(status: &StatusResponse) -> Result<(), Box<dyn std::error::Error>> {
    println!("Result: {}", serde_json::to_string_pretty(status)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ClientArgs = argh::from_env();

    let client = DoctorClient::new(format!("http://{}:{}", args.host, args.port));

    match args.command {
        ClientCommands::Upload(command) => print_status(&client.upload(&command.image_path).await?)?,
        ClientCommands::Analyze(_) => print_status(&client.analyze().await?)?,
        ClientCommands::Status(_) => print_status(&client.status().await?)?,
        ClientCommands::Download(command) => {
            let report = client.report().await?;
            tokio::fs::write(&command.output, report).await?;
            println!("Saved report to {}", command.output.display());
        }
        ClientCommands::Diagnose(command) => {
            let status = client.diagnose(&command.image_path, POLL_INTERVAL).await?;
            match (status.state.as_str(), &status.diagnosis) {
                ("done", Some(diagnosis)) => {
                    if let Some(rating) = &status.rating {
                        println!("Health Rating: {rating}");
                    }
                    println!("{diagnosis}");
                }
                _ => {
                    print_status(&status)?;
                    return Err("Analysis failed".into());
                }
            }
        }
    }

    Ok(())
}
