//! Scaffolding for new edge plugins: a directory with the Dockerfile,
//! `sage.yaml`, Python entry point and docs needed by `pluginctl build`.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

pub const GPU_BASE_IMAGE: &str = "waggle/plugin-base:1.1.1-ml-cuda10.2-l4t";
pub const CPU_BASE_IMAGE: &str = "waggle/plugin-base:1.1.1-ml";
const PYWAGGLE_REQUIREMENT: &str = "pywaggle[all]>=0.55.0";
const APPS_REPOSITORY: &str = "https://github.com/waggle-sensor/sage-apps";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginRequirements {
    pub gpu: bool,
    pub camera: bool,
    pub environmental_sensors: bool,
    pub audio: bool,
    pub python_packages: Vec<String>,
    pub system_packages: Vec<String>,
}

impl PluginRequirements {
    fn python_packages(&self) -> Vec<String> {
        let mut packages: BTreeSet<String> = BTreeSet::new();
        packages.insert(PYWAGGLE_REQUIREMENT.to_string());
        if self.camera {
            packages.extend(["opencv-python>=4.8.0", "numpy>=1.24.0"].map(String::from));
        }
        if self.gpu {
            packages.extend(["torch>=2.0.0", "torchvision>=0.15.0"].map(String::from));
        }
        if self.audio {
            packages.extend(["librosa>=0.10.0", "sounddevice>=0.4.6"].map(String::from));
        }
        packages.extend(self.python_packages.iter().cloned());
        packages.into_iter().collect()
    }

    fn system_packages(&self) -> Vec<String> {
        let mut packages = self.system_packages.clone();
        if self.camera {
            packages.extend(["libgl1-mesa-glx", "libglib2.0-0"].map(String::from));
        }
        if self.audio {
            packages.extend(["libsndfile1", "portaudio19-dev"].map(String::from));
        }
        let mut seen = BTreeSet::new();
        packages.retain(|p| seen.insert(p.clone()));
        packages
    }

    fn hardware(&self) -> Vec<&'static str> {
        [
            (self.gpu, "GPU (for accelerated processing)"),
            (self.camera, "Camera"),
            (self.environmental_sensors, "Environmental sensors"),
            (self.audio, "Audio input"),
        ]
        .into_iter()
        .filter_map(|(needed, label)| needed.then_some(label))
        .collect()
    }
}

#[derive(Debug, Clone)]
pub struct PluginTemplate {
    pub name: String,
    pub description: String,
    pub version: String,
    pub authors: Vec<String>,
    pub license: String,
    pub requirements: PluginRequirements,
}

impl PluginTemplate {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: "1.0.0".to_string(),
            authors: vec!["Sage Team".to_string()],
            license: "MIT".to_string(),
            requirements: PluginRequirements::default(),
        }
    }

    pub fn requirements(mut self, requirements: PluginRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    /// Directory and registry name: lowercase with spaces turned into dashes.
    /// Only ASCII letters, digits, `-`, `_` and `.` survive, and the result
    /// may not start with a dot.
    pub fn slug(&self) -> Result<String> {
        let slug = self.name.trim().to_lowercase().replace(' ', "-");
        let valid = !slug.is_empty()
            && !slug.starts_with('.')
            && slug
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            bail!(
                "Invalid plugin name {:?}: use letters, digits, spaces, '-', '_' or '.'",
                self.name
            );
        }
        Ok(slug)
    }

    pub fn base_image(&self) -> &'static str {
        if self.requirements.gpu {
            GPU_BASE_IMAGE
        } else {
            CPU_BASE_IMAGE
        }
    }

    pub fn requirements_txt(&self) -> String {
        let mut out = self.requirements.python_packages().join("\n");
        out.push('\n');
        out
    }

    pub fn dockerfile(&self) -> String {
        let mut lines = vec![format!("FROM {}", self.base_image()), String::new()];
        let system = self.requirements.system_packages();
        if !system.is_empty() {
            lines.push("# Install system dependencies".to_string());
            lines.push("RUN apt-get update && apt-get install -y \\".to_string());
            lines.extend(system.iter().map(|p| format!("    {} \\", p)));
            lines.push("    && rm -rf /var/lib/apt/lists/*".to_string());
            lines.push(String::new());
        }
        lines.extend(
            [
                "WORKDIR /app",
                "",
                "RUN mkdir -p /data/images models",
                "",
                "COPY requirements.txt .",
                "RUN pip3 install --no-cache-dir -r requirements.txt",
                "",
                "COPY main.py .",
                "COPY utils/ ./utils/",
                "",
                r#"ENTRYPOINT ["python3", "main.py"]"#,
            ]
            .map(String::from),
        );
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    pub fn sage_yaml(&self) -> Result<String> {
        let config = SageYaml {
            name: self.slug()?,
            version: &self.version,
            description: &self.description,
            keywords: String::new(),
            authors: self.authors.join(","),
            license: &self.license,
            homepage: APPS_REPOSITORY,
            source: Source {
                architectures: vec!["linux/arm64", "linux/amd64"],
                url: format!("{}.git", APPS_REPOSITORY),
            },
            resources: Resources {
                gpu: self.requirements.gpu,
                cpu: 1,
                memory: "2Gi",
                storage: "5Gi",
            },
            data: DataDirectory { directory: "/data" },
        };
        serde_yaml::to_string(&config).context("Failed to render sage.yaml")
    }

    pub fn main_py(&self) -> String {
        let req = &self.requirements;
        let mut out = String::from(
            "#!/usr/bin/env python3\n\nimport argparse\nimport logging\nimport time\n\nfrom waggle.plugin import Plugin\n",
        );
        if req.camera {
            out.push_str("from waggle.data.vision import Camera\nimport cv2\nimport numpy as np\n");
        }
        if req.audio {
            out.push_str("import sounddevice as sd\nimport librosa\n");
        }
        if req.gpu {
            out.push_str("import torch\nimport torchvision\n");
        }
        out.push_str(
            "\nlogging.basicConfig(\n    level=logging.INFO,\n    format='%(asctime)s - %(name)s - %(levelname)s - %(message)s'\n)\nlogger = logging.getLogger(__name__)\n\n\n",
        );
        let _ = writeln!(out, "def main():");
        let _ = writeln!(
            out,
            "    parser = argparse.ArgumentParser(description={})",
            python_string(&self.description)
        );
        out.push_str(
            "    parser.add_argument('--interval', type=int, default=30,\n                        help='Seconds between measurements')\n    args = parser.parse_args()\n\n",
        );
        if req.camera {
            out.push_str("    camera = Camera()\n\n");
        }
        out.push_str("    with Plugin() as plugin:\n        try:\n            while True:\n");
        if req.camera {
            out.push_str("                sample = camera.snapshot()\n");
        }
        out.push_str(
            "                # Replace with the plugin's own measurement.\n                plugin.publish('plugin.status', 1)\n                time.sleep(args.interval)\n        except KeyboardInterrupt:\n            logger.info('Stopping plugin...')\n\n\nif __name__ == '__main__':\n    main()\n",
        );
        out
    }

    pub fn readme(&self) -> Result<String> {
        let slug = self.slug()?;
        let mut out = format!("# {}\n\n{}\n\n## Requirements\n\n### Hardware\n", self.name, self.description);
        for hw in self.requirements.hardware() {
            let _ = writeln!(out, "- {}", hw);
        }
        out.push_str("\n### Software\n");
        for pkg in &self.requirements.python_packages {
            let _ = writeln!(out, "- {}", pkg);
        }
        let _ = write!(
            out,
            "\n## Installation\n\n```bash\ngit clone {}.git\ncd {}\npip install -r requirements.txt\n```\n\n\
             ## Usage\n\n```bash\npluginctl build .\npluginctl run .\npluginctl deploy .\n```\n\n\
             ## Data Storage\n\nData is stored in `/data/` with subdirectories per data type.\n\n\
             ## License\n\n{}\n",
            APPS_REPOSITORY, slug, self.license
        );
        Ok(out)
    }

    pub fn science_description(&self) -> String {
        let mut out = format!(
            "# {}\n\n## Overview\n\n{}\n\n## Technical Details\n\n### Hardware Requirements\n",
            self.name, self.description
        );
        for hw in self.requirements.hardware() {
            let _ = writeln!(out, "- {} required", hw);
        }
        out.push_str(
            "\n### Data Storage\n\nThe plugin stores data under `/data/` by data type.\n",
        );
        out
    }
}

#[derive(Serialize)]
struct SageYaml<'a> {
    name: String,
    version: &'a str,
    description: &'a str,
    keywords: String,
    authors: String,
    license: &'a str,
    homepage: &'a str,
    source: Source,
    resources: Resources,
    data: DataDirectory,
}

#[derive(Serialize)]
struct Source {
    architectures: Vec<&'static str>,
    url: String,
}

#[derive(Serialize)]
struct Resources {
    gpu: bool,
    cpu: u32,
    memory: &'static str,
    storage: &'static str,
}

#[derive(Serialize)]
struct DataDirectory {
    directory: &'static str,
}

/// Single-quoted Python literal.
fn python_string(text: &str) -> String {
    format!(
        "'{}'",
        text.replace('\\', "\\\\")
            .replace('\'', "\\'")
            .replace('\n', " ")
    )
}

/// Writes plugin scaffolds below `base_dir`.
pub struct PluginGenerator {
    base_dir: PathBuf,
}

impl PluginGenerator {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Builds the scaffold in a temporary directory next to its final place
    /// and renames it in, so a failed run leaves nothing behind. An existing
    /// plugin directory is never overwritten.
    pub fn generate(&self, template: &PluginTemplate) -> Result<PathBuf> {
        let slug = template.slug()?;
        let target = self.base_dir.join(&slug);
        if target.exists() {
            bail!("{:?} already exists", target);
        }
        std::fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("Failed to create plugin directory {:?}", self.base_dir))?;

        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}-", slug))
            .tempdir_in(&self.base_dir)
            .with_context(|| format!("Failed to create temporary directory in {:?}", self.base_dir))?;
        let root = staging.path();

        write_file(root, "requirements.txt", &template.requirements_txt())?;
        write_file(root, "Dockerfile", &template.dockerfile())?;
        write_file(root, "sage.yaml", &template.sage_yaml()?)?;
        write_file(root, "README.md", &template.readme()?)?;
        write_file(
            root,
            "ecr-meta/ecr-science-description.md",
            &template.science_description(),
        )?;
        write_file(root, "main.py", &template.main_py())?;
        write_file(root, "utils/__init__.py", "")?;
        std::fs::create_dir_all(root.join("models")).context("Failed to create models/")?;
        make_executable(&root.join("main.py"))?;

        std::fs::rename(root, &target)
            .with_context(|| format!("Failed to move plugin into {:?}", target))?;
        info!("Generated plugin scaffold {:?}", target);
        Ok(target)
    }
}

fn write_file(root: &Path, relative: &str, content: &str) -> Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", relative))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("Failed to make {:?} executable", path))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
