use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::script::{fill_template, ScriptValues};
use crate::swatch::{Color, ExtractError, Params};
use crate::extract_color_from_path;

/// Places the renderer is usually installed, checked in order.
pub const KNOWN_RENDERER_PATHS: &[&str] = &[
    "C:/Program Files/Blender Foundation/Blender 4.5/blender.exe",
    "/Applications/Blender.app/Contents/MacOS/Blender",
    "/usr/bin/blender",
    "/snap/bin/blender",
];

/// Errors that can occur while preparing or running renders.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("patterns directory not found: {0}")]
    PatternsDirMissing(PathBuf),

    #[error("no PNG files found in {0}")]
    NoPatterns(PathBuf),

    #[error("renderer executable not found, looked in: {}", .0.join(", "))]
    RendererNotFound(Vec<String>),

    #[error("blend file not found: {0}")]
    BlendFileMissing(PathBuf),

    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not start renderer '{path}': {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not derive thread color for {pattern}: {source}")]
    Extract {
        pattern: String,
        #[source]
        source: ExtractError,
    },

    #[error("renderer exited with {status} for {pattern}")]
    Failed { pattern: String, status: ExitStatus },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> RenderError + '_ {
    move |source| RenderError::Io { path: path.to_path_buf(), source }
}

/// Lists the PNG files in `dir`, sorted by name.
pub fn list_patterns(dir: &Path) -> Result<Vec<String>, RenderError> {
    if !dir.is_dir() {
        return Err(RenderError::PatternsDirMissing(dir.to_path_buf()));
    }

    let mut patterns = vec![];
    for entry in std::fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        let is_png = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("png"));

        if !is_png || !path.is_file() {
            continue;
        }
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => patterns.push(name.to_string()),
            None => warn!("skipping {}: file name is not valid UTF-8", path.display()),
        }
    }

    patterns.sort();
    Ok(patterns)
}

/// Returns `explicit` if it is a file, otherwise the first of the known install locations that is.
pub fn find_renderer(explicit: Option<&Path>) -> Result<PathBuf, RenderError> {
    match explicit {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => Err(RenderError::RendererNotFound(vec![path.display().to_string()])),
        None => KNOWN_RENDERER_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
            .ok_or_else(|| RenderError::RendererNotFound(KNOWN_RENDERER_PATHS.iter().map(|p| p.to_string()).collect())),
    }
}

/// Outcome of a batch. A pattern that failed does not stop the ones after it.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub rendered: Vec<(String, Color)>,
    pub failed: Vec<(String, RenderError)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.rendered.len() + self.failed.len()
    }
}

/// Runs the renderer once per pattern with a freshly filled copy of the template script.
pub struct Renderer {
    executable: PathBuf,
    config: Config,
    template: String,
    params: Params,
    work_dir: PathBuf,
}

impl Renderer {
    /// Checks the blend file exists and reads the template script.
    ///
    /// # Arguments
    ///
    /// * `executable` - The renderer binary, see `find_renderer`.
    /// * `config` - Render settings, with command line overrides already applied.
    /// * `template_path` - The render script with placeholders. It is only read, never written.
    /// * `work_dir` - Where the renderer runs and where the filled script is written.
    pub fn new(executable: PathBuf, config: Config, template_path: &Path, work_dir: PathBuf) -> Result<Renderer, RenderError> {
        let blend_file = work_dir.join(&config.blend_file);
        if !blend_file.exists() {
            return Err(RenderError::BlendFileMissing(config.blend_file.clone()));
        }

        let template = std::fs::read_to_string(template_path).map_err(io_error(template_path))?;

        Ok(Renderer {
            executable,
            config,
            template,
            params: Params::default(),
            work_dir,
        })
    }

    pub fn with_params(mut self, params: Params) -> Renderer {
        self.params = params;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The configured color if there is one, otherwise the swatch color of the pattern.
    pub fn thread_color(&self, pattern_path: &Path) -> Result<Color, ExtractError> {
        match self.config.threads_color {
            Some(color) => Ok(color),
            None => extract_color_from_path(pattern_path, self.params),
        }
    }

    pub fn render_pattern(&self, patterns_dir: &Path, pattern: &str) -> Result<Color, RenderError> {
        let color = self.thread_color(&patterns_dir.join(pattern)).map_err(|source| RenderError::Extract {
            pattern: pattern.to_string(),
            source,
        })?;
        info!("thread color for {}: {}", pattern, color);

        let script = fill_template(&self.template, &ScriptValues::new(&self.config, pattern, color));

        // Removed on drop, whatever the renderer does.
        let mut script_file = tempfile::Builder::new()
            .prefix(".render_temp")
            .suffix(".py")
            .tempfile_in(&self.work_dir)
            .map_err(io_error(&self.work_dir))?;
        script_file.write_all(script.as_bytes()).map_err(io_error(script_file.path()))?;
        script_file.flush().map_err(io_error(script_file.path()))?;

        debug!("running {} with {}", self.executable.display(), script_file.path().display());

        let status = Command::new(&self.executable)
            .arg(&self.config.blend_file)
            .arg("--background")
            .arg("--python")
            .arg(script_file.path())
            .env("PYTHONUNBUFFERED", "1")
            .current_dir(&self.work_dir)
            .status()
            .map_err(|source| RenderError::Spawn { path: self.executable.clone(), source })?;

        if !status.success() {
            return Err(RenderError::Failed { pattern: pattern.to_string(), status });
        }

        Ok(color)
    }

    pub fn render_all(&self, patterns_dir: &Path, patterns: &[String]) -> BatchReport {
        let mut report = BatchReport::default();

        for (i, pattern) in patterns.iter().enumerate() {
            info!("[{}/{}] rendering {}", i + 1, patterns.len(), pattern);
            info!(
                "samples {}, engine {}, resolution {}%, output {}x{}px into {}",
                self.config.samples,
                self.config.engine,
                self.config.resolution_scale,
                self.config.output_width,
                self.config.output_height,
                self.config.output_dir.display()
            );

            match self.render_pattern(patterns_dir, pattern) {
                Ok(color) => {
                    info!("{} render complete", pattern);
                    report.rendered.push((pattern.clone(), color));
                }
                Err(e @ RenderError::Extract { .. }) => {
                    warn!("skipping {}: {}", pattern, e);
                    report.failed.push((pattern.clone(), e));
                }
                Err(e) => {
                    error!("{} render failed: {}", pattern, e);
                    report.failed.push((pattern.clone(), e));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Engine;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn config(blend_file: &str) -> Config {
        Config {
            blend_file: PathBuf::from(blend_file),
            samples: 16,
            engine: Engine::Cycles,
            resolution_scale: 50,
            output_width: 480,
            output_height: 480,
            threads_color: None,
            presets: vec![],
            cameras: vec![],
            output_dir: PathBuf::from("renders"),
        }
    }

    fn write_pattern(dir: &Path, name: &str, pixel: [u8; 4]) {
        RgbaImage::from_pixel(40, 40, Rgba(pixel))
            .save(dir.join(name))
            .expect("Failed to write pattern");
    }

    #[test]
    fn test_list_patterns() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        write_pattern(dir.path(), "b.png", [0, 0, 0, 255]);
        std::fs::write(dir.path().join("a.PNG"), "listed, never decoded").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a pattern").unwrap();
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let patterns = list_patterns(dir.path()).unwrap();
        assert_eq!(patterns, vec!["a.PNG".to_string(), "b.png".to_string()]);
    }

    #[test]
    fn test_list_patterns_missing_dir() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let result = list_patterns(&dir.path().join("patterns"));
        assert!(matches!(result, Err(RenderError::PatternsDirMissing(_))));
    }

    #[test]
    fn test_find_renderer_explicit() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let blender = dir.path().join("blender");
        assert!(matches!(find_renderer(Some(&blender)), Err(RenderError::RendererNotFound(_))));

        std::fs::write(&blender, "").unwrap();
        assert_eq!(find_renderer(Some(&blender)).unwrap(), blender);
    }

    #[test]
    fn test_find_renderer_rejects_directory() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let result = find_renderer(Some(dir.path()));
        assert!(matches!(result, Err(RenderError::RendererNotFound(paths)) if paths == vec![dir.path().display().to_string()]));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_list_patterns_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("ok.png"), "").unwrap();
        std::fs::write(dir.path().join(OsStr::from_bytes(b"bad\xff.png")), "").unwrap();

        let patterns = list_patterns(dir.path()).unwrap();
        assert_eq!(patterns, vec!["ok.png".to_string()]);
    }

    #[test]
    fn test_missing_blend_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let template = dir.path().join("render.py");
        std::fs::write(&template, "").unwrap();

        let result = Renderer::new(PathBuf::from("blender"), config("scene.blend"), &template, dir.path().to_path_buf());
        assert!(matches!(result, Err(RenderError::BlendFileMissing(_))));
    }

    #[test]
    fn test_configured_color_skips_extraction() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("scene.blend"), "").unwrap();
        let template = dir.path().join("render.py");
        std::fs::write(&template, "").unwrap();

        let mut config = config("scene.blend");
        config.threads_color = Some(Color::new(1, 2, 3));
        let renderer = Renderer::new(PathBuf::from("blender"), config, &template, dir.path().to_path_buf()).unwrap();

        let color = renderer.thread_color(&dir.path().join("does-not-exist.png")).unwrap();
        assert_eq!(color, Color::new(1, 2, 3));
    }

    #[test]
    fn test_thread_color_uses_params() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("scene.blend"), "").unwrap();
        let template = dir.path().join("render.py");
        std::fs::write(&template, "").unwrap();

        // Sample rect is x 36..40, y 2..4, all at alpha 150. The corner pixel differs.
        let mut img = RgbaImage::from_pixel(40, 40, Rgba([10, 10, 10, 150]));
        img.put_pixel(36, 2, Rgba([99, 99, 99, 150]));
        let pattern = dir.path().join("faded.png");
        img.save(&pattern).expect("Failed to write pattern");

        let renderer = Renderer::new(PathBuf::from("blender"), config("scene.blend"), &template, dir.path().to_path_buf()).unwrap();
        assert_eq!(renderer.thread_color(&pattern).unwrap(), Color::new(99, 99, 99));

        let renderer = renderer.with_params(Params { alpha_threshold: 100, ..Params::default() });
        assert_eq!(renderer.thread_color(&pattern).unwrap(), Color::new(10, 10, 10));
    }

    // `sh` reads the "blend file" as a shell script: $1..$3 are `--background --python <script>`.
    #[cfg(unix)]
    #[test]
    fn test_render_all_with_stand_in_renderer() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let patterns_dir = dir.path().join("patterns");
        std::fs::create_dir(&patterns_dir).unwrap();
        write_pattern(&patterns_dir, "blue.png", [0, 127, 255, 255]);
        std::fs::write(patterns_dir.join("broken.png"), "not a png").unwrap();

        std::fs::write(dir.path().join("scene.sh"), "cat \"$3\" >> captured.txt\n").unwrap();
        let template = dir.path().join("render.py");
        std::fs::write(&template, "render('__PATTERN_BASE_PLACEHOLDER__', '__THREADS_COLOR_PLACEHOLDER__', __SAMPLES_PLACEHOLDER__)\n").unwrap();

        let renderer = Renderer::new(
            find_renderer(Some(Path::new("/bin/sh"))).unwrap(),
            config("scene.sh"),
            &template,
            dir.path().to_path_buf(),
        )
        .unwrap();

        let patterns = list_patterns(&patterns_dir).unwrap();
        let report = renderer.render_all(&patterns_dir, &patterns);

        assert_eq!(report.total(), 2);
        assert!(!report.is_success());
        assert_eq!(report.rendered, vec![("blue.png".to_string(), Color::new(0, 127, 255))]);
        assert_eq!(report.failed[0].0, "broken.png");
        assert!(matches!(report.failed[0].1, RenderError::Extract { .. }));

        let captured = std::fs::read_to_string(dir.path().join("captured.txt")).unwrap();
        assert_eq!(captured, "render('blue', '#007FFF', 16)\n");

        // Template untouched, filled script cleaned up.
        assert!(std::fs::read_to_string(&template).unwrap().contains("__PATTERN_BASE_PLACEHOLDER__"));
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".render_temp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_renderer_failure_is_reported() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        write_pattern(dir.path(), "red.png", [255, 0, 0, 255]);
        std::fs::write(dir.path().join("scene.sh"), "exit 3\n").unwrap();
        let template = dir.path().join("render.py");
        std::fs::write(&template, "").unwrap();

        let renderer = Renderer::new(PathBuf::from("/bin/sh"), config("scene.sh"), &template, dir.path().to_path_buf()).unwrap();
        let result = renderer.render_pattern(dir.path(), "red.png");

        match result {
            Err(RenderError::Failed { pattern, status }) => {
                assert_eq!(pattern, "red.png");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("expected a failed render, got {:?}", other),
        }
    }
}
