use clap::Parser;
use shared::{Event, LineDecoder, LineTerminator};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::sleep;

/// Joins the arena and fires at every position the hostile walks to.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:1201")]
    server: String,

    /// Name to join under
    #[arg(short = 'n', long, default_value = "archer")]
    name: String,

    /// Board width the server runs with; walks off the right edge are not shot at
    #[arg(short = 'w', long, default_value_t = shared::BOARD_WIDTH)]
    width: u32,

    /// Use CRLF as end of line (default LF)
    #[arg(long)]
    crlf: bool,

    /// Delay before each shot, in milliseconds
    #[arg(short = 'd', long, default_value = "0")]
    delay_ms: u64,

    /// Only watch, never shoot
    #[arg(long)]
    passive: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let terminator = if args.crlf {
        LineTerminator::CrLf
    } else {
        LineTerminator::Lf
    };

    let mut stream = TcpStream::connect(&args.server).await?;
    println!("Connected to {}", args.server);

    stream
        .write_all(&terminator.frame(&format!("START {}", args.name)))
        .await?;
    println!("Joining as {}", args.name);

    let mut decoder = LineDecoder::new(terminator, 4096);
    let mut buf = [0u8; 1024];
    let mut shots = 0u32;

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            println!("Server closed the connection after {} shots", shots);
            break;
        }
        decoder.push(&buf[..n])?;

        while let Some(line) = decoder.next_line() {
            println!("< {}", line);

            match Event::parse(&line) {
                Some(Event::Walk { x, .. }) if x >= i64::from(args.width) => {
                    println!("Hostile escaped");
                }
                Some(Event::Walk { x, y, .. }) if !args.passive => {
                    if args.delay_ms > 0 {
                        sleep(Duration::from_millis(args.delay_ms)).await;
                    }
                    let command = format!("SHOOT {} {}", x, y);
                    println!("> {}", command);
                    stream.write_all(&terminator.frame(&command)).await?;
                    shots += 1;
                }
                Some(Event::Hit { shooter, kills, .. }) if shooter == args.name => {
                    println!("Got it! {} kills so far", kills);
                }
                Some(Event::Error(msg)) => println!("Server rejected a command: {}", msg),
                Some(_) => {}
                None => println!("Unrecognised line: {:?}", line),
            }
        }
    }

    Ok(())
}
