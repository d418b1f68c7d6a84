// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{ArgAction, Command, arg, value_parser};

fn json_flag() -> clap::Arg {
    arg!(--json "Print machine-readable JSON")
}

fn id_arg() -> clap::Arg {
    arg!(<id> "Record id").value_parser(value_parser!(i64))
}

pub fn build_cli() -> Command {
    Command::new("ledgercore")
        .about("Transactional core of a small retail-banking ledger")
        .version(clap::crate_version!())
        .arg(
            arg!(--user <ID> "Acting user id")
                .global(true)
                .value_parser(value_parser!(i64)),
        )
        .arg(arg!(--admin "Act with administrator privileges").global(true))
        .arg(arg!(--config <PATH> "JSON configuration file").global(true))
        .arg(arg!(--"log-json" "Emit logs as JSON lines").global(true))
        .arg(
            arg!(-v --verbose "Increase log verbosity")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(Command::new("init").about("Create the database and schema"))
        .subcommand(
            Command::new("account")
                .about("Open and manage bank accounts")
                .subcommand(
                    Command::new("open")
                        .arg(arg!(--"type" <TYPE> "savings|current|fixed_deposit").required(true))
                        .arg(
                            arg!(--owner <USER> "Owner user id (administrators only)")
                                .value_parser(value_parser!(i64)),
                        )
                        .arg(arg!(--"initial-deposit" <AMOUNT> "Opening balance")),
                )
                .subcommand(
                    Command::new("list")
                        .arg(arg!(--"include-deleted" "Show soft-deleted accounts"))
                        .arg(json_flag()),
                )
                .subcommand(Command::new("show").arg(id_arg()).arg(json_flag()))
                .subcommand(
                    Command::new("update")
                        .arg(id_arg())
                        .arg(arg!(--"type" <TYPE> "savings|current|fixed_deposit"))
                        .arg(arg!(--activate "Re-enable the account").conflicts_with("deactivate"))
                        .arg(arg!(--deactivate "Freeze the account")),
                )
                .subcommand(Command::new("rm").about("Soft-delete an account").arg(id_arg())),
        )
        .subcommand(
            Command::new("transfer")
                .about("Move money to another account or an external bank")
                .arg(
                    arg!(--from <ACCOUNT> "Source account id")
                        .required(true)
                        .value_parser(value_parser!(i64)),
                )
                .arg(
                    arg!(--to <ACCOUNT> "Destination account id")
                        .value_parser(value_parser!(i64))
                        .conflicts_with("external-bank"),
                )
                .arg(arg!(--"external-bank" <NAME> "Destination bank for inter-bank transfers"))
                .arg(arg!(--amount <AMOUNT>).required(true))
                .arg(arg!(--description <TEXT>)),
        )
        .subcommand(
            Command::new("tx")
                .about("Browse the transaction ledger")
                .subcommand(filtered(Command::new("list").arg(json_flag())))
                .subcommand(Command::new("show").arg(id_arg()).arg(json_flag()))
                .subcommand(filtered(
                    Command::new("export")
                        .arg(arg!(--format <FMT> "csv|json").required(true))
                        .arg(arg!(--out <FILE>).required(true)),
                )),
        )
        .subcommand(
            Command::new("fund")
                .about("Mutual funds, holdings and trades")
                .subcommand(
                    Command::new("add")
                        .arg(arg!(--name <NAME>).required(true))
                        .arg(arg!(--symbol <SYMBOL>).required(true))
                        .arg(arg!(--nav <NAV>).required(true)),
                )
                .subcommand(Command::new("list").arg(json_flag()))
                .subcommand(Command::new("show").arg(id_arg()).arg(json_flag()))
                .subcommand(
                    Command::new("set-nav")
                        .arg(id_arg())
                        .arg(arg!(--nav <NAV>).required(true)),
                )
                .subcommand(Command::new("deactivate").arg(id_arg()))
                .subcommand(trade_command("buy").arg(arg!(--amount <AMOUNT>).required(true)))
                .subcommand(trade_command("sell").arg(arg!(--units <UNITS>).required(true)))
                .subcommand(Command::new("holdings").arg(json_flag()))
                .subcommand(Command::new("trades").arg(json_flag())),
        )
        .subcommand(
            Command::new("deposit")
                .about("Fixed and recurring deposits")
                .subcommand(
                    Command::new("create")
                        .arg(
                            arg!(--account <ACCOUNT>)
                                .required(true)
                                .value_parser(value_parser!(i64)),
                        )
                        .arg(arg!(--"type" <TYPE> "fixed|recurring").default_value("fixed"))
                        .arg(
                            arg!(--term <MONTHS>)
                                .required(true)
                                .value_parser(value_parser!(u32)),
                        )
                        .arg(arg!(--amount <AMOUNT>).required(true))
                        .arg(arg!(--rate <PERCENT> "Annual interest rate").required(true)),
                )
                .subcommand(
                    Command::new("list")
                        .arg(arg!(--status <STATUS> "active|cancelled|matured"))
                        .arg(json_flag()),
                )
                .subcommand(Command::new("show").arg(id_arg()).arg(json_flag()))
                .subcommand(Command::new("cancel").arg(id_arg()).arg(json_flag()))
                .subcommand(Command::new("mature").arg(id_arg()))
                .subcommand(Command::new("rm").arg(id_arg())),
        )
}

fn trade_command(name: &'static str) -> Command {
    Command::new(name)
        .arg(
            arg!(--account <ACCOUNT>)
                .required(true)
                .value_parser(value_parser!(i64)),
        )
        .arg(
            arg!(--fund <FUND>)
                .required(true)
                .value_parser(value_parser!(i64)),
        )
}

fn filtered(cmd: Command) -> Command {
    cmd.arg(arg!(--from <DATE> "YYYY-MM-DD"))
        .arg(arg!(--to <DATE> "YYYY-MM-DD"))
        .arg(arg!(--"type" <TYPE> "Transaction type"))
        .arg(arg!(--min <AMOUNT>))
        .arg(arg!(--max <AMOUNT>))
        .arg(arg!(--limit <N>).value_parser(value_parser!(usize)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        build_cli().debug_assert();
    }

    #[test]
    fn global_identity_reaches_nested_subcommands() {
        let m = build_cli().get_matches_from([
            "ledgercore", "--user", "7", "fund", "buy", "--account", "1", "--fund", "2", "--amount",
            "10",
        ]);
        let (_, fund) = m.subcommand().unwrap();
        let (_, buy) = fund.subcommand().unwrap();
        assert_eq!(buy.get_one::<i64>("user"), Some(&7));
        assert!(!buy.get_flag("admin"));
    }

    #[test]
    fn transfer_destinations_conflict() {
        let res = build_cli().try_get_matches_from([
            "ledgercore", "transfer", "--from", "1", "--to", "2", "--external-bank", "X",
            "--amount", "5",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn show_commands_accept_json() {
        for group in ["deposit", "fund"] {
            let m = build_cli().get_matches_from(["ledgercore", group, "show", "3", "--json"]);
            let (_, cmd) = m.subcommand().unwrap();
            let (name, show) = cmd.subcommand().unwrap();
            assert_eq!(name, "show");
            assert_eq!(show.get_one::<i64>("id"), Some(&3));
            assert!(show.get_flag("json"));
        }
    }
}
