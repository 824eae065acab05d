//! arm-microvm CLI tool
//!
//! Creates an arm64 KVM VM, loads a kernel and reports where everything landed.

use std::path::PathBuf;
use std::process;

use arm_microvm::{ActiveConsole, IrqChip, VmBuilder};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let program = program_name(&args);

    if args.len() < 2 {
        print_usage(program);
        return Ok(());
    }

    match args[1].as_str() {
        "load" => cmd_load(&args[2..])?,
        "info" => cmd_info(),
        "help" | "--help" | "-h" => print_usage(program),
        "version" | "--version" | "-V" => print_version(),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_usage(program);
            process::exit(1);
        }
    }

    Ok(())
}

/// argv[0], which a caller of execve may leave out.
fn program_name(args: &[String]) -> &str {
    args.first().map_or("arm-microvm", String::as_str)
}

fn print_usage(program: &str) {
    println!(
        r#"arm-microvm - arm64 KVM VM bootstrap

USAGE:
    {} <COMMAND> [OPTIONS]

COMMANDS:
    load    Create a VM and load a kernel into it
    info    Show hypervisor information
    help    Show this help message
    version Show version information

LOAD OPTIONS:
    --kernel <PATH>     Path to kernel image (required)
    --initrd <PATH>     Path to initrd/initramfs
    --cmdline <STRING>  Kernel command line
    --memory <MB>       Memory size in MB (default: 256)
    --cpus <N>          Number of vCPUs (default: 1)
    --hugetlbfs <DIR>   Back guest memory with a hugetlbfs mount
    --irqchip <NAME>    gicv2, gicv3 or gicv3-its (default: gicv2)
    --console <NAME>    serial or virtio (default: serial)
    --aarch32           Lay memory out for a 32-bit guest

EXAMPLES:
    {} load --kernel Image --initrd initrd.img --memory 1024
    {} load --kernel Image --irqchip gicv3 --cpus 16 --console virtio
"#,
        program, program, program
    );
}

fn print_version() {
    println!("arm-microvm {}", env!("CARGO_PKG_VERSION"));
    if let Some(backend) = arm_microvm::backend_name() {
        println!("Hypervisor: {}", backend);
    }
}

fn cmd_info() {
    println!("Hypervisor Information");
    println!("======================");

    if arm_microvm::is_supported() {
        println!("Status: Available");
        if let Some(name) = arm_microvm::backend_name() {
            println!("Backend: {}", name);
        }
    } else {
        println!("Status: Not available");
        println!("Note: /dev/kvm is missing or reports an unsupported API version.");
    }

    #[cfg(target_arch = "aarch64")]
    println!("Architecture: ARM64 (aarch64)");
    #[cfg(not(target_arch = "aarch64"))]
    println!("Architecture: not arm64, VMs cannot be created here");
}

fn next_value<'a>(args: &'a [String], i: &mut usize, what: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires {}", args[*i - 1], what))
}

fn cmd_load(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = VmBuilder::new();
    let mut have_kernel = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--kernel" | "-k" => {
                builder = builder.kernel(next_value(args, &mut i, "a path")?);
                have_kernel = true;
            }
            "--initrd" | "-i" => {
                builder = builder.initrd(next_value(args, &mut i, "a path")?);
            }
            "--cmdline" | "-c" => {
                builder = builder.cmdline(next_value(args, &mut i, "a string")?);
            }
            "--memory" | "-m" => {
                builder = builder.memory_mb(next_value(args, &mut i, "a number")?.parse()?);
            }
            "--cpus" | "-n" => {
                builder = builder.vcpus(next_value(args, &mut i, "a number")?.parse()?);
            }
            "--hugetlbfs" => {
                builder = builder.hugetlbfs(PathBuf::from(next_value(args, &mut i, "a path")?));
            }
            "--irqchip" => {
                builder = builder.irqchip(next_value(args, &mut i, "a name")?.parse::<IrqChip>()?);
            }
            "--console" => {
                builder =
                    builder.console(next_value(args, &mut i, "a name")?.parse::<ActiveConsole>()?);
            }
            "--aarch32" => {
                builder = builder.aarch32(true);
            }
            other => {
                return Err(format!("Unknown argument: {}", other).into());
            }
        }
        i += 1;
    }

    if !have_kernel {
        return Err("Kernel path is required".into());
    }

    load(builder)
}

#[cfg(target_os = "linux")]
fn load(builder: VmBuilder) -> Result<(), Box<dyn std::error::Error>> {
    if !arm_microvm::is_supported() {
        return Err("KVM is not available on this system".into());
    }

    let mut vm = builder.create()?;
    let placement = *vm.load_configured_images()?;

    println!("Kernel: {} ({} bytes)", placement.kernel_guest_start, placement.kernel_size);
    println!("FDT:    {}", placement.dtb_guest_start);
    if let Some(start) = placement.initrd_guest_start {
        println!("Initrd: {} ({} bytes)", start, placement.initrd_size);
    }
    if let Some(gic) = vm.gic() {
        println!("IRQ chip: {} (distributor at {:#x})", gic.chip(), gic.layout().dist_base);
    }
    println!("Console: {}", vm.active_console());

    vm.delete_ram();
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn load(builder: VmBuilder) -> Result<(), Box<dyn std::error::Error>> {
    builder.build()?;
    Err("KVM is only available on Linux".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_name_without_argv() {
        assert_eq!(program_name(&[]), "arm-microvm");
        assert_eq!(program_name(&["/usr/bin/vmm".to_string()]), "/usr/bin/vmm");
    }
}
