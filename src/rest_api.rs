use rocket::fairing::AdHoc;
use rocket::http::Status;
use rocket::serde::json::{json, Json, Value};
use rocket::State;

use log::{error, info, warn};

use crate::common::{ConnectionState, Identity, RegistratorError, Serial};
use crate::config::RegistratorConfig;
use crate::record::CameraStatus;
use crate::registrator::RegistratorHandle;



type Registrator = RegistratorHandle<CameraStatus>;

#[derive(Debug)]
#[derive(Serialize)]
struct RegistratorInfo {
	#[serde(flatten)]
	identity: Identity,
	wol: Option<String>,
	connection: ConnectionState,
	cameras: usize,
}

fn unavailable(err: RegistratorError) -> Status {
	warn!("Registrator request failed; error was {}", err);
	Status::ServiceUnavailable
}

#[get("/registrator")]
async fn get_registrator(registrator: &State<Registrator>) -> Result<Json<RegistratorInfo>, Status> {
	let connection = registrator.connection_state().await.map_err(unavailable)?;
	let cameras = registrator.cameras_serials().await.map_err(unavailable)?;
	Ok(Json(RegistratorInfo {
		identity: registrator.identity().clone(),
		wol: registrator.wol().map(|address| address.to_string()),
		connection,
		cameras: cameras.len(),
	}))
}

#[get("/cameras")]
async fn list_cameras(registrator: &State<Registrator>) -> Result<Json<Vec<Serial>>, Status> {
	registrator.cameras_serials().await.map(Json).map_err(unavailable)
}

#[get("/cameras/<serial>")]
async fn get_camera(serial: &str, registrator: &State<Registrator>) -> Result<Option<Json<CameraStatus>>, Status> {
	let camera = registrator.camera(serial).await.map_err(unavailable)?;
	Ok(camera.map(Json))
}

// Without a serial this answers for whichever camera comes first
#[get("/status?<serial>")]
async fn get_status(serial: Option<&str>, registrator: &State<Registrator>) -> Result<Json<CameraStatus>, Status> {
	registrator.status(serial.unwrap_or("")).await.map(Json).map_err(unavailable)
}

#[post("/cameras/sweep")]
async fn sweep_cameras(registrator: &State<Registrator>) -> Result<Json<usize>, Status> {
	registrator.sweep().await.map(Json).map_err(unavailable)
}

#[post("/commands/<command>?<params>")]
async fn send_command(command: &str, params: Option<&str>, registrator: &State<Registrator>) -> Result<Json<bool>, Status> {
	registrator.send_command(command, params.unwrap_or("")).await.map(Json).map_err(unavailable)
}

#[catch(404)]
fn not_found() -> Value {
	json!({
		"status": "error",
		"reason": "Resource was not found."
	})
}



pub fn stage(config: RegistratorConfig) -> AdHoc {
	AdHoc::try_on_ignite("Registrator", |rocket| async move {
		// The session has to be spawned on Rocket's runtime
		let registrator = match Registrator::spawn(&config) {
			Ok(registrator) => registrator,
			Err(err) => {
				error!("Cannot start registrator {}: {}", config.name, err);
				return Err(rocket);
			}
		};
		info!("Tracking registrator {} at {}:{}", config.name, config.ip, config.status_port);

		Ok(rocket
			.manage(registrator)
			.register("/", catchers![not_found])
			.mount("/v0", routes![get_registrator, list_cameras, get_camera, get_status, sweep_cameras, send_command]))
	})
}
