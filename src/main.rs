use anyhow::{Context, Result};
use boost_image::checksum::Cksum;
use boost_image::compress::Deflate;
use boost_image::header::consts::{
    DEFAULT_DESCRIPTION, DEFAULT_LOAD_OFFSET, DEFAULT_OUTPUT_NAME, DEFAULT_VERSION, HEADER_SIZE,
};
use boost_image::{
    BoostImage, BuildOptions, ImageBuilder, Layout, OuterHeader, SplitImage, Verification,
};
use clap::{crate_authors, crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use console::ConsoleOutputHandler;
use humansize::{format_size, BINARY};
use input::MappedInput;
use log::LevelFilter;
use std::path::{Path, PathBuf};
use termcolor::ColorChoice;

const ARG_EXTRACT_LONG_HELP: &str = "
Extract the components of a BooSt image.

Kernel, bootcode and ramdisk are written to 'uImage', 'bcode' and 'initrd' in the output directory. Payloads that do not start with an ARM branch are written whole to 'payload.bin'. Checksum mismatches are reported but do not stop the extraction.
";

fn main() {
    let mut console = ConsoleOutputHandler::new(ColorChoice::Auto);
    let matches = create_app().get_matches();

    let level = match matches.get_count("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let _ = simple_logger::SimpleLogger::new().with_level(level).init();

    let result = match matches.subcommand() {
        Some(("info", arguments)) => main_info(arguments, &mut console),
        Some(("check", arguments)) => main_check(arguments, &mut console),
        Some(("extract", arguments)) => main_extract(arguments, &mut console),
        Some(("create", arguments)) => main_create(arguments, &mut console),
        _ => unreachable!(),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(error) => {
            let cause: &dyn std::error::Error = error.as_ref();
            console.print_fatal_error("command failed", Some(cause))
        }
    }
}

fn create_app() -> Command {
    Command::new("boost")
        .version(crate_version!())
        .author(crate_authors!())
        .about("Psion/Teklogix NetBook Pro BooSt image tool.")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("Log more details, repeat for even more"),
        )
        .subcommand(create_app_info())
        .subcommand(create_app_check())
        .subcommand(create_app_extract())
        .subcommand(create_app_create())
}

fn input_file_arg() -> Arg {
    Arg::new("input_file")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("The BooSt image, for example 'nBkProOs.img'")
        .value_name("INPUT_FILE")
}

fn create_app_info() -> Command {
    Command::new("info")
        .about("Prints the header of a BooSt image.")
        .arg(input_file_arg())
}

fn create_app_check() -> Command {
    Command::new("check")
        .about("Verifies the header and image checksums.")
        .arg(input_file_arg())
}

fn create_app_extract() -> Command {
    Command::new("extract")
        .about("Extracts kernel, bootcode and ramdisk from a BooSt image.")
        .long_about(ARG_EXTRACT_LONG_HELP)
        .arg(input_file_arg())
        .arg(
            Arg::new("output_dir")
                .short('d')
                .long("directory")
                .value_parser(value_parser!(PathBuf))
                .default_value(".")
                .help("Directory to write the components into")
                .value_name("OUTPUT_DIR"),
        )
}

fn create_app_create() -> Command {
    Command::new("create")
        .about("Creates a BooSt image.")
        .arg(
            Arg::new("zlib")
                .short('z')
                .long("zlib")
                .action(ArgAction::SetTrue)
                .help("Compress a kernel-only image")
                .long_help(
                    "Compress a kernel-only image with deflate. Images carrying a bootcode \
                     are always compressed.",
                ),
        )
        .arg(
            Arg::new("kernel")
                .short('k')
                .long("kernel")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Linux kernel image")
                .value_name("KERNEL"),
        )
        .arg(
            Arg::new("bootcode")
                .short('b')
                .long("bootcode")
                .value_parser(value_parser!(PathBuf))
                .help("Low level initialization code, starting with its sub-header")
                .value_name("BOOTCODE"),
        )
        .arg(
            Arg::new("ramdisk")
                .short('r')
                .long("ramdisk")
                .requires("bootcode")
                .value_parser(value_parser!(PathBuf))
                .help("Linux ramdisk image")
                .value_name("RAMDISK"),
        )
        .arg(
            Arg::new("description")
                .long("description")
                .default_value(DEFAULT_DESCRIPTION)
                .help("Image description stored in the header")
                .value_name("TEXT"),
        )
        .arg(
            Arg::new("image_version")
                .long("image-version")
                .default_value(DEFAULT_VERSION)
                .help("Image version string stored in the header")
                .value_name("TEXT"),
        )
        .arg(
            Arg::new("load_offset")
                .long("load-offset")
                .value_parser(parse_u32)
                .help("Memory address the image is loaded to")
                .long_help(format!(
                    "Memory address the image is loaded to. Accepts decimal or 0x-prefixed \
                     hexadecimal values. Defaults to {:#010x}.",
                    DEFAULT_LOAD_OFFSET
                ))
                .value_name("ADDRESS"),
        )
        .arg(
            Arg::new("output_file")
                .value_parser(value_parser!(PathBuf))
                .default_value(DEFAULT_OUTPUT_NAME)
                .help("The image to create")
                .value_name("OUTPUT_FILE"),
        )
}

fn parse_u32(value: &str) -> std::result::Result<u32, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|error| format!("'{}' is not a 32-bit address: {}", value, error))
}

fn main_info(arguments: &ArgMatches, console: &mut ConsoleOutputHandler) -> Result<bool> {
    let header = &read_header(arguments)?;

    console.print_message(&format!("  Platform ID:     {}", header.platform()));
    console.print_message(&format!("  Target filename: {}", header.target_filename()));
    console.print_message(&format!("  Load offset:     {:#010x}", header.load_offset));
    console.print_message(&format!(
        "  Branch offset:   {}",
        header.informational_branch_offset()
    ));
    console.print_message(&format!("  Mutex bits:      {:#x}", header.mutex_bits));
    console.print_message(&format!("  Header checksum: {}", header.checksum));
    console.print_message("  Image:");
    console.print_message(&format!("    * ID:          {:?}", header.image_id));
    console.print_message(&format!("    * Name:        {}", header.description()));
    console.print_message(&format!("    * Version:     {}", header.version()));
    console.print_message(&format!(
        "    * Size:        {}",
        format_size(header.image_size, BINARY)
    ));
    console.print_message(&format!("    * Checksum:    {}", header.image_checksum));
    console.print_message(&format!(
        "    * Layout:      {}",
        if Layout::classify(header).is_legacy() { "legacy" } else { "new" }
    ));
    console.print_message(&format!("  Flags ({:#010x}):", header.flags.bits()));
    for name in header.flags.descriptions() {
        console.print_message(&format!("    * {}", name));
    }

    Ok(true)
}

fn main_check(arguments: &ArgMatches, console: &mut ConsoleOutputHandler) -> Result<bool> {
    let image = read_image(arguments)?;
    let verification = image.verify(&Cksum);
    report_verification(&verification, console);
    Ok(verification.is_ok())
}

fn main_extract(arguments: &ArgMatches, console: &mut ConsoleOutputHandler) -> Result<bool> {
    let image = read_image(arguments)?;
    let output_dir = arguments
        .get_one::<PathBuf>("output_dir")
        .expect("output_dir has a default");

    // Checksums are advisory: report, then extract anyway.
    report_verification(&image.verify(&Cksum), console);

    let split = image
        .split(&Deflate::default())
        .context("Failed to unpack the payload")?;
    if image.header().is_compressed() {
        console.print_status_success("Unpacked", "compressed payload.");
    }

    if !output_dir.exists() {
        std::fs::create_dir_all(output_dir).with_context(|| {
            format!("Could not create '{}' directory", output_dir.display())
        })?;
        console.print_status_success(
            "Created",
            &format!("directory '{}'.", output_dir.display()),
        );
    }

    match split {
        SplitImage::Parts(parts) => {
            if let Layout::New(version) = image.layout() {
                log::info!("new layout image, version '{}'", version);
            }
            let components = [
                ("Kernel", output_dir.join("uImage"), &parts.kernel),
                ("Bootstrap", output_dir.join("bcode"), &parts.bootcode),
                ("RAM disk", output_dir.join("initrd"), &parts.ramdisk),
            ];
            let files: Vec<(&Path, &[u8])> = components
                .iter()
                .map(|(_, path, data)| (path.as_path(), data.as_slice()))
                .collect();
            output::write_all_atomically(&files)?;

            for (name, path, data) in &components {
                console.print_status_success(
                    "Unpacked",
                    &format!(
                        "{} ({}) into '{}'.",
                        name,
                        format_size(data.len(), BINARY),
                        path.display()
                    ),
                );
            }
        }
        SplitImage::Opaque(payload) => {
            console.print_warning_message("unknown image format, writing the payload whole.");
            let path = output_dir.join("payload.bin");
            output::write_atomically(&path, &payload)?;
            console.print_status_success(
                "Unpacked",
                &format!("payload into '{}'.", path.display()),
            );
        }
    }

    Ok(true)
}

fn main_create(arguments: &ArgMatches, console: &mut ConsoleOutputHandler) -> Result<bool> {
    let kernel = MappedInput::open(
        arguments
            .get_one::<PathBuf>("kernel")
            .expect("kernel is required"),
    )?;
    let bootcode = arguments
        .get_one::<PathBuf>("bootcode")
        .map(|path| MappedInput::open(path))
        .transpose()?;
    let ramdisk = arguments
        .get_one::<PathBuf>("ramdisk")
        .map(|path| MappedInput::open(path))
        .transpose()?;
    let output_path = arguments
        .get_one::<PathBuf>("output_file")
        .expect("output_file has a default");

    let options = BuildOptions {
        description: arguments
            .get_one::<String>("description")
            .cloned()
            .unwrap_or_default(),
        version: arguments
            .get_one::<String>("image_version")
            .cloned()
            .unwrap_or_default(),
        load_offset: arguments
            .get_one::<u32>("load_offset")
            .copied()
            .unwrap_or(DEFAULT_LOAD_OFFSET),
        compress: arguments.get_flag("zlib"),
    };

    let mut builder = ImageBuilder::new(&kernel).options(options);
    if let Some(bootcode) = &bootcode {
        builder = builder.bootcode(bootcode);
    }
    if let Some(ramdisk) = &ramdisk {
        builder = builder.ramdisk(ramdisk);
    }

    let image = builder
        .build(&Cksum, &Deflate::default())
        .context("Failed to build the image")?;
    output::write_atomically(output_path, &image.to_bytes())?;

    console.print_status_success(
        "Created",
        &format!(
            "'{}' ({} payload).",
            output_path.display(),
            format_size(image.header().image_size, BINARY)
        ),
    );
    Ok(true)
}

fn read_header(arguments: &ArgMatches) -> Result<OuterHeader> {
    let input_path = arguments
        .get_one::<PathBuf>("input_file")
        .expect("input_file is required");
    let input = MappedInput::open(input_path)?;
    let raw: &[u8; HEADER_SIZE] = input
        .get(..HEADER_SIZE)
        .and_then(|bytes| bytes.try_into().ok())
        .with_context(|| format!("Failed to read BooSt header of '{}'", input_path.display()))?;
    Ok(OuterHeader::parse(raw))
}

fn read_image(arguments: &ArgMatches) -> Result<BoostImage> {
    let input_path = arguments
        .get_one::<PathBuf>("input_file")
        .expect("input_file is required");
    let input = MappedInput::open(input_path)?;
    BoostImage::parse(&input)
        .with_context(|| format!("Failed to read BooSt image '{}'", input_path.display()))
}

fn report_verification(verification: &Verification, console: &mut ConsoleOutputHandler) {
    for (name, status) in [
        ("Header", verification.header),
        ("Image", verification.payload),
    ] {
        if status.is_ok() {
            console.print_status_success("Checksum", &format!("{} OK.", name.to_lowercase()));
        } else if status.truncated {
            console.print_warning_message(&format!(
                "{} checksum failed (data is truncated, expected {}, got {} over the bytes present).",
                name, status.expected, status.actual
            ));
        } else {
            console.print_warning_message(&format!(
                "{} checksum failed (expected {}, got {}).",
                name, status.expected, status.actual
            ));
        }
    }
}

mod input {
    use anyhow::{Context, Result};
    use memmap2::Mmap;
    use std::fs::File;
    use std::ops::Deref;
    use std::path::Path;

    /// A read-only view of an input file, unmapped when dropped.
    pub enum MappedInput {
        Mapped(Mmap),
        Empty,
    }

    impl MappedInput {
        pub fn open(path: &Path) -> Result<Self> {
            let file = File::open(path)
                .with_context(|| format!("Failed to open '{}'", path.display()))?;
            let len = file
                .metadata()
                .with_context(|| format!("Failed to read stat of '{}'", path.display()))?
                .len();
            if len == 0 {
                return Ok(MappedInput::Empty);
            }
            // The mapping is private and read-only, and lives no longer than
            // the command that opened it.
            let map = unsafe { Mmap::map(&file) }
                .with_context(|| format!("Failed to memory map '{}'", path.display()))?;
            Ok(MappedInput::Mapped(map))
        }
    }

    impl Deref for MappedInput {
        type Target = [u8];

        fn deref(&self) -> &[u8] {
            match self {
                MappedInput::Mapped(map) => map,
                MappedInput::Empty => &[],
            }
        }
    }
}

mod output {
    use anyhow::{Context, Result};
    use std::io::Write;
    use std::path::Path;
    use tempfile::NamedTempFile;

    /// Writes `data` next to `path` and renames it into place, so a failure
    /// never leaves a partial file behind.
    pub fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
        write_all_atomically(&[(path, data)])
    }

    /// Like [`write_atomically`] for several files. Every file is written to
    /// its temporary location before any of them is renamed into place.
    pub fn write_all_atomically(files: &[(&Path, &[u8])]) -> Result<()> {
        let mut staged = Vec::with_capacity(files.len());
        for &(path, data) in files {
            staged.push((path, stage(path, data)?));
        }
        for (path, file) in staged {
            file.persist(path)
                .with_context(|| format!("Failed to move output into '{}'", path.display()))?;
        }
        Ok(())
    }

    fn stage(path: &Path, data: &[u8]) -> Result<NamedTempFile> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create a temporary file in '{}'", dir.display()))?;
        file.write_all(data)
            .with_context(|| format!("Failed to write '{}'", path.display()))?;
        Ok(file)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn nothing_is_persisted_when_a_later_file_fails() {
            let dir = tempfile::tempdir().unwrap();
            let kernel = dir.path().join("uImage");
            let bootcode = dir.path().join("missing").join("bcode");

            let result = write_all_atomically(&[
                (kernel.as_path(), &[1u8; 8][..]),
                (bootcode.as_path(), &[2u8; 8][..]),
            ]);
            assert!(result.is_err());
            assert!(!kernel.exists());
            assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        }

        #[test]
        fn all_files_are_written() {
            let dir = tempfile::tempdir().unwrap();
            let kernel = dir.path().join("uImage");
            let ramdisk = dir.path().join("initrd");

            write_all_atomically(&[
                (kernel.as_path(), &[1u8; 8][..]),
                (ramdisk.as_path(), &[][..]),
            ])
            .unwrap();
            assert_eq!(std::fs::read(&kernel).unwrap(), [1u8; 8]);
            assert!(std::fs::read(&ramdisk).unwrap().is_empty());
        }
    }
}

mod console {
    use std::error::Error;
    use std::io::Write;
    use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

    /// An interface for the application to the console output. Handles things
    /// like formatting.
    ///
    /// If this structure ever fails writing, the error will be silently
    /// ignored.
    pub struct ConsoleOutputHandler {
        stream: StandardStream,
    }

    impl ConsoleOutputHandler {
        /// Creates a new structure.
        pub fn new(color: ColorChoice) -> Self {
            ConsoleOutputHandler {
                stream: StandardStream::stdout(color),
            }
        }

        pub fn print_message(&mut self, message: &str) {
            let _ = self.stream.set_color(&ColorSpec::new());
            let _ = writeln!(self.stream, "{}", message);
        }

        pub fn print_error_message(&mut self, message: &str) {
            let _ = self
                .stream
                .set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));

            let _ = write!(self.stream, "error: ");
            self.print_message(message);
        }

        pub fn print_warning_message(&mut self, message: &str) {
            let _ = self
                .stream
                .set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true));

            let _ = write!(self.stream, "warning: ");
            self.print_message(message);
        }

        fn print_status(&mut self, colour: &ColorSpec, status: &str, message: &str) {
            let _ = self.stream.set_color(colour);
            let _ = write!(self.stream, "{: >12}", status);
            let _ = self.stream.set_color(&ColorSpec::new());
            let _ = writeln!(self.stream, " {}", message);
        }

        pub fn print_status_success(&mut self, status: &str, message: &str) {
            self.print_status(
                ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true),
                status,
                message,
            );
        }

        fn print_error_cause(&mut self, mut error_opt: Option<&dyn Error>, colour: Color) {
            let mut colour_spec = ColorSpec::new();
            colour_spec.set_fg(Some(colour));

            while let Some(error) = error_opt {
                let _ = self.stream.set_color(&colour_spec);
                let _ = write!(self.stream, "caused by: ");
                self.print_message(&format!("{}", error));
                error_opt = error.source();
            }
        }

        pub fn print_error_as_error(&mut self, message: &str, error_opt: Option<&dyn Error>) {
            self.print_error_message(message);
            self.print_error_cause(error_opt, Color::Red);
        }

        pub fn print_fatal_error(&mut self, message: &str, error_opt: Option<&dyn Error>) -> ! {
            use std::process::exit;
            self.print_error_as_error(message, error_opt);
            exit(1);
        }
    }
}
