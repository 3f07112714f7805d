// engine.rs — the fisheye engine state, owned by the host's render subsystem

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::globe::{Globe, MAX_PLATES};
use crate::lens::{FovState, Lens};
use crate::lensmap::LensBuilder;
use crate::palette::build_tint_tables;
use crate::script::ScriptHost;

/// Geometry of the rubix diagnostic overlay. A plate is split into a grid of
/// units; each colored cell is `cell_size` units wide with `pad_size` units
/// of padding between cells.
pub struct Rubix {
    pub enabled: bool,
    pub numcells: i32,
    pub cell_size: f64,
    pub pad_size: f64,
}

pub struct FisheyeEngine {
    /// master toggle; the host renders normally when this is off
    pub enabled: bool,

    pub(crate) script: ScriptHost,
    pub globe: Globe,
    pub lens: Lens,
    pub fov: FovState,
    pub builder: LensBuilder,
    pub rubix: Rubix,

    pub(crate) base_palette: [u8; 768],
    pub(crate) tint_tables: [[u8; 256]; MAX_PLATES],

    gamedir: PathBuf,

    // previous viewport size, for change detection
    pub(crate) prev_width: i32,
    pub(crate) prev_height: i32,
}

impl FisheyeEngine {
    pub fn new(gamedir: &Path) -> Self {
        Self {
            enabled: false,
            script: ScriptHost::new(),
            globe: Globe::new(),
            lens: Lens::new(),
            fov: FovState::new(),
            builder: LensBuilder::new(),
            rubix: Rubix {
                enabled: false,
                numcells: 10,
                cell_size: 4.0,
                pad_size: 1.0,
            },
            base_palette: [0; 768],
            tint_tables: [[0; 256]; MAX_PLATES],
            gamedir: gamedir.to_path_buf(),
            prev_width: -1,
            prev_height: -1,
        }
    }

    /// Install the host's base palette and rebuild the tint tables.
    pub fn set_palette(&mut self, palette: &[u8; 768]) {
        self.base_palette = *palette;
        self.tint_tables = build_tint_tables(palette);
    }

    /// Default command sequence, run once at startup.
    pub fn init(&mut self) {
        self.execute_string("globe cube");
        self.execute_string("lens panini");
        self.execute_string("hfov 180");
        self.execute_string("rubixgrid 10 4 1");
    }

    pub fn gamedir(&self) -> &Path {
        &self.gamedir
    }

    pub fn lenses_dir(&self) -> PathBuf {
        self.gamedir.join("../lenses")
    }

    pub fn globes_dir(&self) -> PathBuf {
        self.gamedir.join("../globes")
    }

    /// Emit the console commands that recreate the current state.
    pub fn write_config(&self, writer: &mut dyn Write) -> io::Result<()> {
        if self.fov.hfov != 0.0 {
            writeln!(writer, "hfov {}", self.fov.hfov)?;
        } else if self.fov.vfov != 0.0 {
            writeln!(writer, "vfov {}", self.fov.vfov)?;
        } else if self.fov.hfit {
            writeln!(writer, "hfit")?;
        } else if self.fov.vfit {
            writeln!(writer, "vfit")?;
        } else if self.fov.fit {
            writeln!(writer, "fit")?;
        }

        writeln!(writer, "fisheye {}", self.enabled as i32)?;
        writeln!(writer, "lens \"{}\"", self.lens.name)?;
        writeln!(writer, "globe \"{}\"", self.globe.name)?;
        writeln!(
            writer,
            "rubixgrid {} {} {}",
            self.rubix.numcells, self.rubix.cell_size, self.rubix.pad_size
        )?;
        Ok(())
    }
}
