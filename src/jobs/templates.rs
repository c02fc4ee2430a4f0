//! Ready-made jobs for the plugins commonly deployed on nodes.
//!
//! Every template takes its parameters as a JSON object so tools can pass
//! them through unchanged. Device credentials (cameras, lidars) have no
//! defaults and must be supplied by the caller.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::models::{
    always_rule, cron_rule, every_minutes, JobSpec, NodeValue, PluginArguments, PluginSpec,
    SelectorRequirements,
};
use super::JobError;

const REGISTRY: &str = "registry.sagecontinuum.org";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    ImageSampler,
    PtzSampler,
    YoloDetector,
    PtzYolo,
    AirQuality,
    MobotixScan,
    AudioSampler,
    CameraSampler,
    CameraSamplerTop,
    CloudCover,
    SolarIrradiance,
    SoundEventDetection,
    AvianDiversityMonitoring,
    WeatherClassification,
    WaggleAqt,
    WaggleWxt536,
    MlSuite,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 17] = [
        TemplateKind::ImageSampler,
        TemplateKind::PtzSampler,
        TemplateKind::YoloDetector,
        TemplateKind::PtzYolo,
        TemplateKind::AirQuality,
        TemplateKind::MobotixScan,
        TemplateKind::AudioSampler,
        TemplateKind::CameraSampler,
        TemplateKind::CameraSamplerTop,
        TemplateKind::CloudCover,
        TemplateKind::SolarIrradiance,
        TemplateKind::SoundEventDetection,
        TemplateKind::AvianDiversityMonitoring,
        TemplateKind::WeatherClassification,
        TemplateKind::WaggleAqt,
        TemplateKind::WaggleWxt536,
        TemplateKind::MlSuite,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TemplateKind::ImageSampler => "image_sampler",
            TemplateKind::PtzSampler => "ptz_sampler",
            TemplateKind::YoloDetector => "yolo_detector",
            TemplateKind::PtzYolo => "ptz_yolo",
            TemplateKind::AirQuality => "air_quality",
            TemplateKind::MobotixScan => "mobotix_scan",
            TemplateKind::AudioSampler => "audio_sampler",
            TemplateKind::CameraSampler => "camera_sampler",
            TemplateKind::CameraSamplerTop => "camera_sampler_top",
            TemplateKind::CloudCover => "cloud_cover",
            TemplateKind::SolarIrradiance => "solar_irradiance",
            TemplateKind::SoundEventDetection => "sound_event_detection",
            TemplateKind::AvianDiversityMonitoring => "avian_diversity_monitoring",
            TemplateKind::WeatherClassification => "weather_classification",
            TemplateKind::WaggleAqt => "waggle_aqt",
            TemplateKind::WaggleWxt536 => "waggle_wxt536",
            TemplateKind::MlSuite => "ml_suite",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TemplateKind::ImageSampler => "Camera snapshots every N minutes",
            TemplateKind::PtzSampler => "PTZ camera snapshots over preset positions",
            TemplateKind::YoloDetector => "YOLO object detection on camera images (GPU)",
            TemplateKind::PtzYolo => "PTZ camera sweep with YOLO detection (needs camera credentials)",
            TemplateKind::AirQuality => "Air quality monitoring, runs continuously",
            TemplateKind::MobotixScan => "Mobotix thermal camera scan (needs camera credentials)",
            TemplateKind::AudioSampler => "Audio sampling every 15 minutes",
            TemplateKind::CameraSampler => "Bottom camera snapshot hourly (needs camera credentials)",
            TemplateKind::CameraSamplerTop => "Top camera snapshot hourly (needs camera credentials)",
            TemplateKind::CloudCover => "Cloud cover estimation from the sky camera (GPU)",
            TemplateKind::SolarIrradiance => "Solar irradiance estimation",
            TemplateKind::SoundEventDetection => "Sound event detection",
            TemplateKind::AvianDiversityMonitoring => "Bird species detection from audio (GPU)",
            TemplateKind::WeatherClassification => "Weather classification from lidar (needs lidar credentials)",
            TemplateKind::WaggleAqt => "Vaisala AQT air quality sensor",
            TemplateKind::WaggleWxt536 => "Vaisala WXT536 weather station",
            TemplateKind::MlSuite => "Cloud cover, solar irradiance, sound events and avian monitoring together",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn names() -> String {
        Self::ALL
            .iter()
            .map(TemplateKind::name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn params<T: DeserializeOwned>(kind: TemplateKind, value: &Value) -> Result<T, JobError> {
    let empty = Value::Object(Default::default());
    let value = if value.is_null() { &empty } else { value };
    T::deserialize(value)
        .map_err(|e| JobError::InvalidTemplate(format!("{} parameters: {}", kind.name(), e)))
}

fn require(kind: TemplateKind, field: &str, value: &str) -> Result<(), JobError> {
    if value.trim().is_empty() {
        return Err(JobError::InvalidTemplate(format!(
            "{} requires a non-empty {}",
            kind.name(),
            field
        )));
    }
    Ok(())
}

macro_rules! default_fn {
    ($name:ident, $ty:ty, $value:expr) => {
        fn $name() -> $ty {
            $value
        }
    };
}

default_fn!(ten, u32, 10);
default_fn!(fifteen, u32, 15);
default_fn!(five, u32, 5);
default_fn!(twenty, u32, 20);
default_fn!(sixty, u32, 60);
default_fn!(one, u32, 1);
default_fn!(default_confidence, f64, 0.25);
default_fn!(yes, bool, true);

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ImageSamplerParams {
    #[serde(default = "ten")]
    interval_mins: u32,
    #[serde(default = "default_width")]
    width: u32,
    #[serde(default = "default_height")]
    height: u32,
}
default_fn!(default_width, u32, 1920);
default_fn!(default_height, u32, 1080);

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PtzSamplerParams {
    #[serde(default = "fifteen")]
    interval_mins: u32,
    #[serde(default = "default_presets")]
    preset_positions: Vec<u32>,
}
default_fn!(default_presets, Vec<u32>, vec![1, 2, 3]);

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct YoloDetectorParams {
    #[serde(default = "default_yolo_model")]
    model: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default = "ten")]
    interval_mins: u32,
}
default_fn!(default_yolo_model, String, "yolov5s".to_string());

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PtzYoloParams {
    camera_ip: String,
    username: String,
    password: String,
    #[serde(default = "ten")]
    iterations: u32,
    #[serde(default = "default_objects")]
    objects: String,
    #[serde(default = "default_pan_step")]
    pan_step: u32,
    #[serde(default)]
    tilt: i32,
    #[serde(default = "one")]
    zoom: u32,
    #[serde(default = "default_yolov8_model")]
    model: String,
    #[serde(default = "default_iter_delay")]
    iter_delay: f64,
    #[serde(default = "default_confidence")]
    confidence: f64,
}
default_fn!(default_objects, String, "person,car,truck".to_string());
default_fn!(default_pan_step, u32, 45);
default_fn!(default_yolov8_model, String, "yolov8n".to_string());
default_fn!(default_iter_delay, f64, 1.0);

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoParams {}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MobotixScanParams {
    username: String,
    password: String,
    #[serde(default = "default_mobotix_ip")]
    camera_ip: String,
    #[serde(default = "default_mobotix_mode")]
    mode: String,
    #[serde(default = "default_direction")]
    direction: String,
    #[serde(default = "default_angle")]
    angle: String,
    #[serde(default = "default_mobotix_presets")]
    preset_positions: String,
    #[serde(default = "one")]
    interval_mins: u32,
}
default_fn!(default_mobotix_ip, String, "camera-mobotix-thermal".to_string());
default_fn!(default_mobotix_mode, String, "direction".to_string());
default_fn!(default_direction, String, "south".to_string());
default_fn!(default_angle, String, "15".to_string());
default_fn!(
    default_mobotix_presets,
    String,
    "NEH,NEB,NEG,EH,EB,EG,SEH,SEB,SEG,SH,SB,SG,SWH,SWB,SWG".to_string()
);

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CameraSamplerParams {
    camera_username: String,
    camera_password: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CloudCoverParams {
    #[serde(default = "default_stream")]
    camera_stream: String,
    #[serde(default = "ten")]
    interval_mins: u32,
}
default_fn!(default_stream, String, "top_camera".to_string());

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SolarIrradianceParams {
    #[serde(default = "default_gps_server")]
    gps_server: String,
}
default_fn!(
    default_gps_server,
    String,
    "wes-gps-server.default.svc.cluster.local".to_string()
);

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SoundEventParams {
    #[serde(default = "five")]
    duration_s: u32,
    #[serde(default = "yes")]
    publish: bool,
    #[serde(default = "ten")]
    interval_mins: u32,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AvianParams {
    #[serde(default = "default_num_recordings")]
    num_recordings: u32,
    #[serde(default = "default_sound_interval")]
    sound_interval: u32,
    #[serde(default = "five")]
    interval_mins: u32,
}
default_fn!(default_num_recordings, u32, 2);
default_fn!(default_sound_interval, u32, 30);

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WeatherClassificationParams {
    lidar_ip: String,
    lidar_password: String,
    #[serde(default = "sixty")]
    interval_mins: u32,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceParams {
    device: Option<String>,
    #[serde(default = "ten")]
    interval_mins: u32,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MlSuiteParams {
    #[serde(default = "ten")]
    cloud_cover_interval: u32,
    #[serde(default = "ten")]
    sound_event_interval: u32,
    #[serde(default = "five")]
    avian_monitoring_interval: u32,
    #[serde(default = "twenty")]
    cloud_motion_interval: u32,
}

fn cloud_cover_plugin(stream: &str) -> PluginSpec {
    PluginSpec::new(
        "cloud-cover-top",
        format!("{}/seonghapark/cloud-cover:0.1.3", REGISTRY),
    )
    .args(PluginArguments::from_pairs([("stream", stream)]))
    .selector(SelectorRequirements::gpu())
}

fn solar_irradiance_plugin(gps_server: &str) -> PluginSpec {
    PluginSpec::new(
        "solar-irradiance",
        format!("{}/seonghapark/solar-irradiance:0.1.0", REGISTRY),
    )
    .env("WAGGLE_GPS_SERVER", gps_server)
}

fn sound_event_plugin(duration_s: u32, publish: bool) -> PluginSpec {
    PluginSpec::new(
        "sound-event-detection",
        format!("{}/dariodematties/sound-event-detection:0.1.1", REGISTRY),
    )
    .args(PluginArguments::from_pairs([
        ("DURATION_S", duration_s.to_string()),
        ("PUBLISH", publish.to_string()),
    ]))
}

fn avian_plugin(num_recordings: u32, sound_interval: u32) -> PluginSpec {
    PluginSpec::new(
        "avian-diversity-monitoring",
        format!("{}/dariodematties1/avian-diversity-monitoring:0.2.4", REGISTRY),
    )
    .args(PluginArguments::from_pairs([
        ("num_rec", num_recordings),
        ("sound_int", sound_interval),
    ]))
    .selector(SelectorRequirements::gpu())
}

fn device_plugin(name: &str, image: &str, device: &str) -> PluginSpec {
    PluginSpec::new(name, format!("{}/{}", REGISTRY, image))
        .args(PluginArguments::from_pairs([("device", device)]))
        .selector(SelectorRequirements::default().with("zone", "core"))
        .privileged()
}

fn camera_snapshot_command(position: &str, username: &str, password: &str) -> String {
    format!(
        "wget -O ./sample.jpg \"http://camera-{pos}-rgb-hanwha/stw-cgi/video.cgi?msubmenu=snapshot&action=view\" \
         --user {user} --password '{pass}' && python3 /app/upload.py --name {pos}_camera --file-path /sample.jpg",
        pos = position,
        user = username,
        pass = password.replace('\'', r"'\''"),
    )
}

/// Builds the job for a template. `args` is the template's JSON parameter
/// object (or null for defaults).
pub fn build(
    kind: TemplateKind,
    job_name: &str,
    nodes: Vec<String>,
    args: &Value,
) -> Result<JobSpec, JobError> {
    let job = JobSpec::new(job_name, nodes);
    let job = match kind {
        TemplateKind::ImageSampler => {
            let p: ImageSamplerParams = params(kind, args)?;
            job.plugin(
                PluginSpec::new("image-sampler", "waggle/plugin-image-sampler:0.2.0")
                    .args(PluginArguments::from_pairs([("width", p.width), ("height", p.height)]))
                    .selector(SelectorRequirements::camera()),
            )
            .rule(cron_rule("image-sampler", &every_minutes(p.interval_mins)))
        }
        TemplateKind::PtzSampler => {
            let p: PtzSamplerParams = params(kind, args)?;
            let positions = p
                .preset_positions
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            job.plugin(
                PluginSpec::new("ptz-sampler", "waggle/plugin-ptz-sampler:0.3.0")
                    .args(PluginArguments::from_pairs([("positions", positions)]))
                    .selector(SelectorRequirements::camera()),
            )
            .rule(cron_rule("ptz-sampler", &every_minutes(p.interval_mins)))
        }
        TemplateKind::YoloDetector => {
            let p: YoloDetectorParams = params(kind, args)?;
            job.plugin(
                PluginSpec::new("yolo-detector", "waggle/plugin-yolo-detector:0.4.0")
                    .args(PluginArguments::from_pairs([
                        ("model", p.model),
                        ("confidence", p.confidence.to_string()),
                    ]))
                    .selector(SelectorRequirements {
                        gpu: true,
                        camera: true,
                        ..Default::default()
                    }),
            )
            .rule(cron_rule("yolo-detector", &every_minutes(p.interval_mins)))
        }
        TemplateKind::PtzYolo => {
            let p: PtzYoloParams = params(kind, args)?;
            require(kind, "camera_ip", &p.camera_ip)?;
            require(kind, "username", &p.username)?;
            require(kind, "password", &p.password)?;
            job.plugin(
                PluginSpec::new(job_name, "plebbyd/ptzapp-yolo:0.1.12")
                    .args(PluginArguments::from_pairs([
                        ("iterations", p.iterations.to_string()),
                        ("objects", p.objects),
                        ("username", p.username),
                        ("password", p.password),
                        ("cameraip", p.camera_ip),
                        ("panstep", p.pan_step.to_string()),
                        ("tilt", p.tilt.to_string()),
                        ("zoom", p.zoom.to_string()),
                        ("model", p.model),
                        ("iterdelay", p.iter_delay.to_string()),
                        ("confidence", p.confidence.to_string()),
                    ]))
                    .selector(SelectorRequirements {
                        gpu: true,
                        camera: true,
                        ..Default::default()
                    }),
            )
        }
        TemplateKind::AirQuality => {
            let _: NoParams = params(kind, args)?;
            let mut job = job
                .plugin(
                    PluginSpec::new(
                        "air-quality",
                        format!("{}/seanshahkarami/air-quality:0.2.0", REGISTRY),
                    )
                    .args(PluginArguments::from_pairs([("device", "/host/dev/airquality")]))
                    .selector(SelectorRequirements::default().with("resource.airquality", "true"))
                    .privileged(),
                )
                .rule(always_rule("air-quality"));
            job.node_value = NodeValue::True;
            job.success_criteria.push("WallClock('1day')".to_string());
            job
        }
        TemplateKind::MobotixScan => {
            let p: MobotixScanParams = params(kind, args)?;
            require(kind, "username", &p.username)?;
            require(kind, "password", &p.password)?;
            let direction_flag = format!("-{}", p.direction.trim_start_matches('-'));
            job.plugin(
                PluginSpec::new(
                    "mobotix-scan-direction",
                    format!("{}/bhupendraraut/mobotix-scan:0.24.8.20", REGISTRY),
                )
                .args(PluginArguments::from_pairs([
                    ("ip".to_string(), p.camera_ip),
                    ("mode".to_string(), p.mode),
                    (direction_flag, p.angle),
                    ("pt".to_string(), p.preset_positions),
                    ("u".to_string(), p.username),
                    ("p".to_string(), p.password),
                ])),
            )
            .rule(cron_rule(
                "mobotix-scan-direction",
                &every_minutes(p.interval_mins),
            ))
        }
        TemplateKind::AudioSampler => {
            let _: NoParams = params(kind, args)?;
            job.plugin(PluginSpec::new(
                "audio-sampler",
                format!("{}/seanshahkarami/audio-sampler:0.4.1", REGISTRY),
            ))
            .rule(cron_rule("audio-sampler", &every_minutes(15)))
        }
        TemplateKind::CameraSampler | TemplateKind::CameraSamplerTop => {
            let p: CameraSamplerParams = params(kind, args)?;
            require(kind, "camera_username", &p.camera_username)?;
            require(kind, "camera_password", &p.camera_password)?;
            let position = if kind == TemplateKind::CameraSamplerTop {
                "top"
            } else {
                "bottom"
            };
            let plugin_name = format!("imagesampler-{}", position);
            let command = camera_snapshot_command(position, &p.camera_username, &p.camera_password);
            job.plugin(
                PluginSpec::new(
                    plugin_name.as_str(),
                    format!("{}/yonghokim/imagesampler:0.3.7", REGISTRY),
                )
                .raw_args(vec!["-c".to_string(), command])
                .selector(SelectorRequirements::default().with("zone", "core"))
                .entrypoint("/bin/bash"),
            )
            .rule(cron_rule(&plugin_name, "10 * * * *"))
        }
        TemplateKind::CloudCover => {
            let p: CloudCoverParams = params(kind, args)?;
            job.plugin(cloud_cover_plugin(&p.camera_stream))
                .rule(cron_rule("cloud-cover-top", &every_minutes(p.interval_mins)))
        }
        TemplateKind::SolarIrradiance => {
            let p: SolarIrradianceParams = params(kind, args)?;
            job.plugin(solar_irradiance_plugin(&p.gps_server))
                .rule(always_rule("solar-irradiance"))
        }
        TemplateKind::SoundEventDetection => {
            let p: SoundEventParams = params(kind, args)?;
            job.plugin(sound_event_plugin(p.duration_s, p.publish))
                .rule(cron_rule(
                    "sound-event-detection",
                    &every_minutes(p.interval_mins),
                ))
        }
        TemplateKind::AvianDiversityMonitoring => {
            let p: AvianParams = params(kind, args)?;
            job.plugin(avian_plugin(p.num_recordings, p.sound_interval))
                .rule(cron_rule(
                    "avian-diversity-monitoring",
                    &every_minutes(p.interval_mins),
                ))
        }
        TemplateKind::WeatherClassification => {
            let p: WeatherClassificationParams = params(kind, args)?;
            require(kind, "lidar_ip", &p.lidar_ip)?;
            require(kind, "lidar_password", &p.lidar_password)?;
            // Runs at minute 5 every N hours.
            let hours = (p.interval_mins / 60).clamp(1, 23);
            job.plugin(
                PluginSpec::new(
                    "weather-classification",
                    format!("{}/rjackson/weatherclassification:2025.6.20", REGISTRY),
                )
                .args(PluginArguments::from_pairs([
                    ("IP", p.lidar_ip),
                    ("password", p.lidar_password),
                ]))
                .selector(SelectorRequirements::gpu()),
            )
            .rule(cron_rule(
                "weather-classification",
                &format!("5 */{} * * *", hours),
            ))
        }
        TemplateKind::WaggleAqt => {
            let p: DeviceParams = params(kind, args)?;
            let device = p
                .device
                .unwrap_or_else(|| "/host/dev/waggle-crocus-mux-p4".to_string());
            job.plugin(device_plugin(
                "waggle-aqt",
                "jrobrien/waggle-aqt:0.23.5.04",
                &device,
            ))
            .rule(cron_rule("waggle-aqt", &every_minutes(p.interval_mins)))
        }
        TemplateKind::WaggleWxt536 => {
            let p: DeviceParams = params(kind, args)?;
            let device = p
                .device
                .unwrap_or_else(|| "/host/dev/waggle-crocus-mux-p3".to_string());
            job.plugin(device_plugin(
                "waggle-wxt536",
                "jrobrien/waggle-wxt536:0.24.11.14",
                &device,
            ))
            .rule(cron_rule("waggle-wxt536", &every_minutes(p.interval_mins)))
        }
        TemplateKind::MlSuite => {
            let p: MlSuiteParams = params(kind, args)?;
            let mut job = job
                .plugin(cloud_cover_plugin("top_camera"))
                .plugin(solar_irradiance_plugin(&default_gps_server()))
                .plugin(sound_event_plugin(5, true))
                .plugin(avian_plugin(2, 30))
                .rule(cron_rule(
                    "cloud-cover-top",
                    &every_minutes(p.cloud_cover_interval),
                ))
                .rule(always_rule("solar-irradiance"))
                .rule(cron_rule(
                    "sound-event-detection",
                    &every_minutes(p.sound_event_interval),
                ))
                .rule(cron_rule(
                    "avian-diversity-monitoring",
                    &every_minutes(p.avian_monitoring_interval),
                ));
            if p.cloud_motion_interval > 0 {
                job = job.rule(cron_rule(
                    "cloud-motion-top",
                    &every_minutes(p.cloud_motion_interval),
                ));
            }
            job
        }
    };
    Ok(job)
}

/// One entry of a multi-plugin configuration.
#[derive(Debug, Deserialize)]
struct MultiPluginEntry {
    plugin_type: String,
    #[serde(default)]
    args: Value,
}

/// Builds a job from a multi-plugin configuration: either a JSON array of
/// `{"plugin_type": ..., "args": {...}}` or `{"preset": "ml_suite", ...}`.
pub fn build_multi(job_name: &str, nodes: Vec<String>, config: &str) -> Result<JobSpec, JobError> {
    let value: Value = serde_json::from_str(config)
        .map_err(|e| JobError::InvalidTemplate(format!("plugins_config is not valid JSON: {}", e)))?;

    if let Value::Object(mut object) = value {
        let preset = object
            .remove("preset")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| {
                JobError::InvalidTemplate(
                    "plugins_config object must name a preset, e.g. {\"preset\": \"ml_suite\"}"
                        .to_string(),
                )
            })?;
        let kind = TemplateKind::parse(&preset)
            .filter(|k| *k == TemplateKind::MlSuite)
            .ok_or_else(|| JobError::InvalidTemplate(format!("unknown preset '{}'", preset)))?;
        return build(kind, job_name, nodes, &Value::Object(object));
    }

    let entries: Vec<MultiPluginEntry> = serde_json::from_value(value).map_err(|e| {
        JobError::InvalidTemplate(format!(
            "plugins_config must be an array of {{\"plugin_type\", \"args\"}} objects: {}",
            e
        ))
    })?;
    if entries.is_empty() {
        return Err(JobError::InvalidTemplate(
            "plugins_config lists no plugins".to_string(),
        ));
    }

    let mut job = JobSpec::new(job_name, nodes.clone());
    for entry in entries {
        let kind = TemplateKind::parse(&entry.plugin_type).ok_or_else(|| {
            JobError::InvalidTemplate(format!(
                "unknown plugin type '{}'. Available types: {}",
                entry.plugin_type,
                TemplateKind::names()
            ))
        })?;
        let part = build(kind, job_name, nodes.clone(), &entry.args)?;
        for plugin in part.plugins {
            if job.plugins.iter().any(|p| p.name == plugin.name) {
                return Err(JobError::InvalidTemplate(format!(
                    "plugin '{}' is listed more than once",
                    plugin.name
                )));
            }
            job.plugins.push(plugin);
        }
        job.science_rules.extend(part.science_rules);
        job.success_criteria.extend(part.success_criteria);
        if part.node_value == NodeValue::True {
            job.node_value = NodeValue::True;
        }
    }
    Ok(job)
}
