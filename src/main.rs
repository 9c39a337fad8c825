use clap::{Command, Arg, ArgAction};
use clustervms_registrator::{config, rest_api};
use rocket::{Request, Response};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;



// Since the UI is served by another server, we may need to setup CORS to allow the UI to make requests to this server.
pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
	fn info(&self) -> Info {
		Info {
			name: "Add CORS headers to responses",
			kind: Kind::Response
		}
	}

	async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
		response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
		response.set_header(Header::new("Access-Control-Allow-Methods", "POST, GET, OPTIONS"));
		response.set_header(Header::new("Access-Control-Allow-Headers", "*"));
		response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
	}
}


#[rocket::main]
async fn main() -> anyhow::Result<()> {
	let matches = Command::new("clustervms-registrator")
		.version("0.0.1")
		.about("Tracks the cameras behind a registrator for ClusterVMS.")
		.arg(
			Arg::new("config")
				.action(ArgAction::Append)	// Allow argument to be specified multiple times
				.short('c')
				.long("config")
				.help("TOML file with registrator config")
		)
		.get_matches();

	let config = match matches.get_many::<String>("config") {
		Some(filenames) => {
			let filenames: Vec<&str> = filenames.map(|v| v.as_str()).collect();
			config::read_config(&filenames).await?
		},
		None => {
			// Use default file path
			config::read_default_config_files().await?
		}
	};

	rocket::build()
		.attach(rest_api::stage(config.registrator))
		.attach(CORS)
		.launch()
		.await?;

	anyhow::Ok(())
}
