// This is my main entry point for the blockchain CLI application
// Every command builds an explicit Config and hands it to the node; there is
// no global state anywhere in the binary
use clap::Parser;
use data_encoding::HEXLOWER;
use log::{error, LevelFilter};
use std::process;
use utxo_chain::{
    convert_address, hash_pub_key, validate_address, Command, Config, Node, Opt, Transaction,
    Wallets,
};

fn main() {
    // Info by default, RUST_LOG still wins
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    // Usage errors exit with 1 like every other failure; --help and --version exit 0
    let opt = match Opt::try_parse() {
        Ok(opt) => opt,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };

    if let Err(e) = run_command(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(opt.config.as_deref())?;

    match opt.command {
        // Genesis block plus its UTXO entry, written together
        Command::Createblockchain { address } => {
            if !validate_address(&address) {
                return Err(format!("Invalid address: {address}").into());
            }
            Node::create(config, &address)?;
            println!("Done!");
        }
        Command::Createwallet => {
            let mut wallets = Wallets::load(config.wallet_path())?;
            let address = wallets.create_wallet()?;
            println!("Your new address: {address}")
        }
        Command::GetBalance { address } => {
            if !validate_address(&address) {
                return Err(format!("Invalid address: {address}").into());
            }
            let node = Node::open(config)?;
            let balance = node.balance(&address)?;
            println!("Balance of {address}: {balance}");
        }
        Command::ListAddresses => {
            let wallets = Wallets::load(config.wallet_path())?;
            for address in wallets.get_addresses() {
                println!("{address}")
            }
        }
        Command::Send {
            from,
            to,
            amount,
            mine,
        } => {
            if !validate_address(&from) {
                return Err(format!("Invalid sender address: {from}").into());
            }
            if !validate_address(&to) {
                return Err(format!("Invalid recipient address: {to}").into());
            }
            if amount == 0 {
                return Err("Amount must be positive".into());
            }

            let wallets = Wallets::load(config.wallet_path())?;
            let wallet = wallets.require_wallet(&from)?;
            let node = Node::open(config)?;
            let transaction = Transaction::new_utxo_transaction(wallet, &to, amount, node.utxo_set())?;

            if mine {
                // The sender also collects the block reward
                let block = node
                    .blockchain()
                    .mine_block_with_reward(&[transaction], &from)?;
                println!("Mined block {}", block.get_hash_hex());
            } else {
                // No networking here: hand the signed transaction to whoever relays it
                println!("{}", HEXLOWER.encode(&transaction.serialize()?));
            }
            println!("Success!")
        }
        Command::Printchain => {
            let node = Node::open(config)?;
            for block in node.iterator() {
                let block = block?;
                println!("Pre block hash: {}", HEXLOWER.encode(block.get_pre_block_hash()));
                println!("Cur block hash: {}", block.get_hash_hex());
                println!("Cur block Timestamp: {}", block.get_timestamp());
                println!("Height: {}", block.get_height());

                for tx in block.get_transactions() {
                    println!("- Transaction txid_hex: {}", tx.get_id_hex());

                    if !tx.is_coinbase() {
                        for input in tx.get_vin() {
                            let pub_key_hash = hash_pub_key(input.get_pub_key());
                            let address = convert_address(pub_key_hash.as_slice());
                            println!(
                                "-- Input txid = {}, vout = {}, from = {}",
                                HEXLOWER.encode(input.get_txid()),
                                input.get_vout(),
                                address,
                            )
                        }
                    }
                    for output in tx.get_vout() {
                        let address = convert_address(output.get_pub_key_hash());
                        println!("-- Output value = {}, to = {}", output.get_value(), address)
                    }
                }
                println!()
            }
        }
        // Rebuild the UTXO index from the blocks tree
        Command::Reindexutxo => {
            let node = Node::open(config)?;
            node.reindex()?;
            let count = node.utxo_set().count_transactions()?;
            println!("Done! There are {count} transactions in the UTXO set.");
        }
    }
    Ok(())
}
