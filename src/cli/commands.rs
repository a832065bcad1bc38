use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "utxo-chain")]
pub struct Opt {
    #[arg(
        long = "config",
        global = true,
        help = "TOML configuration file (environment variables override it)"
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createblockchain", about = "Create a new blockchain")]
    Createblockchain {
        #[arg(help = "The address to send genesis block reward to")]
        address: String,
    },
    #[command(name = "createwallet", about = "Create a new wallet")]
    Createwallet,
    #[command(
        name = "getbalance",
        about = "Get the wallet balance of the target address"
    )]
    GetBalance {
        #[arg(help = "The wallet address")]
        address: String,
    },
    #[command(name = "listaddresses", about = "Print local wallet addresses")]
    ListAddresses,
    #[command(name = "send", about = "Send transaction between addresses")]
    Send {
        #[arg(help = "Source wallet address")]
        from: String,
        #[arg(help = "Destination wallet address")]
        to: String,
        #[arg(help = "Amount to send")]
        amount: u64,
        #[arg(long = "mine", help = "Mine immediately on the same node")]
        mine: bool,
    },
    #[command(name = "printchain", about = "Print all blocks in the blockchain")]
    Printchain,
    #[command(name = "reindexutxo", about = "Rebuild UTXO index set")]
    Reindexutxo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_mine_flag() {
        let opt = Opt::try_parse_from(["utxo-chain", "send", "a", "b", "4", "--mine"]).unwrap();
        match opt.command {
            Command::Send {
                amount, mine, ..
            } => {
                assert_eq!(amount, 4);
                assert!(mine);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let opt = Opt::try_parse_from(["utxo-chain", "send", "a", "b", "4"]).unwrap();
        assert!(matches!(opt.command, Command::Send { mine: false, .. }));
    }

    #[test]
    fn test_bad_amount_is_usage_error() {
        assert!(Opt::try_parse_from(["utxo-chain", "send", "a", "b", "-4"]).is_err());
        assert!(Opt::try_parse_from(["utxo-chain", "mine"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let opt =
            Opt::try_parse_from(["utxo-chain", "printchain", "--config", "node.toml"]).unwrap();
        assert_eq!(opt.config, Some(PathBuf::from("node.toml")));
    }
}
