use hexgait::experiments::env_flat_walk::{run_taxis_demo, run_walk_demo, WalkDemoConfig};

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() >= 2 && (args[1] == "--help" || args[1] == "-h" || args[1] == "help") {
        print_help();
        return;
    }
    if args.len() >= 2 && args[1] == "taxis-demo" {
        run_taxis_demo(WalkDemoConfig {
            run_time: 4.0,
            ..WalkDemoConfig::default()
        });
        return;
    }
    if args.len() >= 2 && args[1] != "walk-demo" {
        eprintln!("Unknown command: {}", args[1]);
        print_help();
        std::process::exit(2);
    }

    run_walk_demo(WalkDemoConfig::default());
}

fn print_help() {
    println!("hexgait - CPG-driven hexapod locomotion controller");
    println!();
    println!("Usage:");
    println!("  hexgait [walk-demo]   straight walking with a mid-run turn");
    println!("  hexgait taxis-demo    odor taxis toward a synthetic source");
    println!("  hexgait help          this message");
}
