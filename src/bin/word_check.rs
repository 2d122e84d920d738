use clap::{App, Arg, SubCommand};
use shiritori::config::Config;
use shiritori::dictionary;
use shiritori::validation::{Rejection, check_rules, normalize};

#[tokio::main]
async fn main() {
    let matches = App::new("单词检查器")
        .version("1.0")
        .about("按接龙规则检查单词")
        .subcommand(
            SubCommand::with_name("lookup").about("查询单词是否在词典中").arg(
                Arg::with_name("word")
                    .help("要查询的单词")
                    .required(true)
                    .index(1),
            ),
        )
        .subcommand(
            SubCommand::with_name("check")
                .about("按完整规则检查单词")
                .arg(
                    Arg::with_name("word")
                        .help("要检查的单词")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("letter")
                        .help("起始字母")
                        .long("letter")
                        .short('l')
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("last")
                        .help("上一个单词，设置后忽略起始字母")
                        .long("last")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("used")
                        .help("已经用过的单词")
                        .long("used")
                        .takes_value(true)
                        .multiple_occurrences(true),
                ),
        )
        .get_matches();

    // 初始化配置
    if let Err(e) = Config::init() {
        eprintln!("配置初始化失败: {}", e);
        return;
    }
    let config = Config::get();

    let dictionary = match dictionary::from_config(&config.dictionary) {
        Ok(dictionary) => dictionary,
        Err(e) => {
            eprintln!("词典初始化失败: {}", e);
            return;
        }
    };

    match matches.subcommand() {
        Some(("lookup", args)) => {
            let word = args.value_of("word").unwrap_or_default();
            match dictionary.contains(word).await {
                Ok(true) => println!("✓ {} 在词典中", word),
                Ok(false) => println!("✗ {} 不在词典中", word),
                Err(e) => eprintln!("查询失败: {}", e),
            }
        }
        Some(("check", args)) => {
            let word = args.value_of("word").unwrap_or_default();

            let required_letter = args
                .value_of("last")
                .and_then(|last| normalize(last).chars().last())
                .or_else(|| args.value_of("letter").and_then(|l| l.trim().chars().next()));
            let Some(required_letter) = required_letter else {
                eprintln!("需要提供 --letter 或 --last");
                return;
            };

            let used: Vec<String> = args
                .values_of("used")
                .map(|values| values.map(normalize).collect())
                .unwrap_or_default();

            let result = match check_rules(
                word,
                used.iter().map(String::as_str),
                required_letter,
                config.game.min_word_length,
            ) {
                Ok(normalized) => match dictionary.contains(&normalized).await {
                    Ok(true) => Ok(normalized),
                    Ok(false) => Err(Rejection::NotInDictionary),
                    Err(e) => {
                        eprintln!("词典查询失败: {}", e);
                        Err(Rejection::NotInDictionary)
                    }
                },
                Err(rejection) => Err(rejection),
            };

            match result {
                Ok(normalized) => println!("✓ {} 可以使用", normalized),
                Err(rejection) => println!("✗ {}", rejection),
            }
        }
        _ => {
            println!("请使用 --help 查看可用命令");
        }
    }
}
