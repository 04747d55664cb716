use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{CompilerConfig, PyAutoGuiRenderer, ScriptCompiler};
use crate::actions::Action;
use crate::{RecorderError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub script: PathBuf,
    pub images_dir: PathBuf,
    pub image_count: usize,
    pub instruction_count: usize,
}

/// Writes `<name>.py` and a sibling `<name>_images/` directory holding the
/// reference images the program verifies against.
#[derive(Debug, Clone, Default)]
pub struct ScriptExporter {
    compiler: ScriptCompiler,
    renderer: PyAutoGuiRenderer,
}

impl ScriptExporter {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            renderer: PyAutoGuiRenderer::from_config(&config),
            compiler: ScriptCompiler::with_config(config),
        }
    }

    pub fn export(&self, actions: &[Action], path: impl AsRef<Path>) -> Result<ExportSummary> {
        let script_path = path.as_ref().with_extension("py");
        let stem = script_path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RecorderError::persistence(&script_path, "script path has no file name"))?;
        let images_name = format!("{stem}_images");
        let images_dir = script_path.with_file_name(&images_name);

        let compiled = self.compiler.compile(actions);

        fs::create_dir_all(&images_dir)
            .map_err(|e| RecorderError::persistence(&images_dir, e))?;
        for reference in &compiled.images {
            let image_path = images_dir.join(&reference.file_name);
            reference
                .image
                .save_png(&image_path)
                .map_err(|e| RecorderError::persistence(&image_path, e))?;
        }

        let source = self.renderer.render(&compiled, &images_name);
        fs::write(&script_path, source).map_err(|e| RecorderError::persistence(&script_path, e))?;

        info!(
            script = %script_path.display(),
            images = compiled.images.len(),
            "Exported script"
        );
        Ok(ExportSummary {
            script: script_path,
            images_dir,
            image_count: compiled.images.len(),
            instruction_count: compiled.instructions.len(),
        })
    }
}
