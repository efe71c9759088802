use snapeval_lexer::Lexer;
use std::env;
use std::fs;
use std::io::{self, Read};

fn main() {
    let args: Vec<String> = env::args().collect();

    let input = if args.len() > 1 {
        // Read from file
        let filename = &args[1];
        fs::read_to_string(filename).unwrap_or_else(|e| {
            eprintln!("Error reading file '{}': {}", filename, e);
            std::process::exit(1);
        })
    } else {
        // Read from stdin
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer).unwrap_or_else(|e| {
            eprintln!("Error reading stdin: {}", e);
            std::process::exit(1);
        });
        buffer
    };

    // Print tokens with their byte spans
    for token in Lexer::new(&input) {
        match token {
            Ok(token) => {
                println!("{:>5}..{:<5} {:?}", token.span.start, token.span.end, token.kind);
            }
            Err(e) => {
                eprintln!("Error during tokenization at {}: {}", e.span.start, e);
                std::process::exit(1);
            }
        }
    }
}
